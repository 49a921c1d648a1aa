//! Persisted folder-navigation history (`folder_history.json`), read and
//! written as a flat list of recently visited directories.
//!
//! Deserialization accepts both the legacy bare-string-list shape and the
//! current object-list shape, so a history file written by an older client
//! still loads cleanly.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub path: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub timestamp: f64,
}

fn default_count() -> u32 {
    1
}

/// Either shape the file might hold on disk: a bare list of paths (legacy),
/// or a list of `HistoryItem` objects (current).
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryFileShape {
    Legacy(Vec<String>),
    Current(Vec<HistoryItem>),
}

fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn load(history_path: &Path) -> Vec<HistoryItem> {
    let Ok(contents) = std::fs::read_to_string(history_path) else {
        return Vec::new();
    };

    match serde_json::from_str::<HistoryFileShape>(&contents) {
        Ok(HistoryFileShape::Current(items)) => items,
        Ok(HistoryFileShape::Legacy(paths)) => {
            let timestamp = now_timestamp();
            paths
                .into_iter()
                .map(|path| HistoryItem {
                    path,
                    count: 1,
                    timestamp,
                })
                .collect()
        }
        Err(e) => {
            log::warn!("ignoring unreadable history file {}: {e}", history_path.display());
            Vec::new()
        }
    }
}

pub fn save(history_path: &Path, items: &[HistoryItem]) -> Result<(), ApiError> {
    let json = serde_json::to_string_pretty(items).map_err(|e| ApiError::Internal { message: e.to_string() })?;
    std::fs::write(history_path, json).map_err(|e| ApiError::io(history_path.display().to_string(), e))
}

pub fn default_history_path(base_dir: &Path) -> PathBuf {
    base_dir.join("folder_history.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_empty_when_file_missing() {
        let dir = tempdir().unwrap();
        let items = load(&dir.path().join("folder_history.json"));
        assert!(items.is_empty());
    }

    #[test]
    fn load_accepts_legacy_string_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folder_history.json");
        std::fs::write(&path, r#"["/a", "/b"]"#).unwrap();
        let items = load(&path);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].path, "/a");
        assert_eq!(items[0].count, 1);
    }

    #[test]
    fn load_accepts_current_object_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folder_history.json");
        std::fs::write(&path, r#"[{"path": "/a", "count": 3, "timestamp": 100.0}]"#).unwrap();
        let items = load(&path);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].count, 3);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folder_history.json");
        let items = vec![HistoryItem {
            path: "/a".to_string(),
            count: 2,
            timestamp: 42.0,
        }];
        save(&path, &items).unwrap();
        let loaded = load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].path, "/a");
        assert_eq!(loaded[0].count, 2);
    }
}

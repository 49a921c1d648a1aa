//! Types shared by the scanner and workers: the heterogeneous work-item
//! queue, per-request configuration, and the result summary returned to
//! the caller.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One scanner-produced, worker-consumed filesystem action. `root` is the
/// original top-level source path this item was discovered under, used to
/// attribute per-root errors back to the user's request.
#[derive(Debug, Clone)]
pub enum WorkItem {
    CopyFile { src: PathBuf, dst: PathBuf, root: PathBuf },
    Mkdir { dst: PathBuf, root: PathBuf },
    DeleteFile { path: PathBuf, root: PathBuf },
    RmdirEmpty { path: PathBuf, root: PathBuf },
}

impl WorkItem {
    pub fn root(&self) -> &PathBuf {
        match self {
            WorkItem::CopyFile { root, .. }
            | WorkItem::Mkdir { root, .. }
            | WorkItem::DeleteFile { root, .. }
            | WorkItem::RmdirEmpty { root, .. } => root,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub sources: Vec<PathBuf>,
    pub destination: Option<PathBuf>,
    pub overwrite: bool,
    pub verify_checksum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub path: String,
    pub status: ItemStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: String,
    pub success_count: u64,
    pub fail_count: u64,
    pub results: Vec<ItemResult>,
}

impl OperationResult {
    pub fn new() -> Self {
        Self {
            status: "completed".to_string(),
            success_count: 0,
            fail_count: 0,
            results: Vec::new(),
        }
    }

    pub fn push_success(&mut self, path: String) {
        self.success_count += 1;
        self.results.push(ItemResult {
            path,
            status: ItemStatus::Success,
            message: None,
        });
    }

    pub fn push_error(&mut self, path: String, message: String) {
        self.fail_count += 1;
        self.results.push(ItemResult {
            path,
            status: ItemStatus::Error,
            message: Some(message),
        });
    }
}

impl Default for OperationResult {
    fn default() -> Self {
        Self::new()
    }
}

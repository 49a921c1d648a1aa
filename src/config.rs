//! Environment-variable configuration.
//!
//! Read once at startup; nothing reloads it at runtime.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// The confinement root every path resolves against.
    pub base_dir: PathBuf,
    /// Initial directory a UI client should open to; purely advisory.
    pub start_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let base_dir = std::env::var("BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_base_dir());
        let start_dir = std::env::var("START_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.clone());
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8731);

        Self {
            base_dir,
            start_dir,
            host,
            port,
        }
    }
}

/// Falls back to the invoking user's Documents folder, then home, then `/tmp`.
fn default_base_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_dir_never_panics() {
        let _ = default_base_dir();
    }
}

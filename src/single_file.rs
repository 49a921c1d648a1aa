//! Single-item filesystem operations: listing, creation, rename, and plain
//! text read/write. Anything that touches more than one path at a time
//! belongs in [`crate::bulk`] instead.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub kind: EntryKind,
    pub absolute_path: String,
    pub size: Option<u64>,
    pub modified_time: Option<u64>,
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest {
            message: "name can't be empty".to_string(),
        });
    }
    for ch in trimmed.chars() {
        if ch == '/' || ch == '\0' {
            return Err(ApiError::BadRequest {
                message: format!("name contains a disallowed character: {ch:?}"),
            });
        }
    }
    if trimmed.len() >= 255 {
        return Err(ApiError::BadRequest {
            message: format!("name is {} bytes, which exceeds the 255 byte limit", trimmed.len()),
        });
    }
    Ok(())
}

fn entry_from_path(path: &Path) -> Result<FileEntry, ApiError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| ApiError::io(path.display().to_string(), e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let kind = if metadata.is_dir() { EntryKind::Directory } else { EntryKind::File };
    let size = if metadata.is_dir() { None } else { Some(metadata.len()) };
    let modified_time = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    Ok(FileEntry {
        name,
        kind,
        absolute_path: path.to_string_lossy().to_string(),
        size,
        modified_time,
    })
}

/// Lists the immediate children of `dir`, directories first then files,
/// each group in case-insensitive natural-sort order. Children that can't be
/// stat'd (e.g. permission denied, or removed mid-listing) are omitted
/// rather than failing the whole listing.
pub fn list(dir: &Path) -> Result<Vec<FileEntry>, ApiError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ApiError::io(dir.display().to_string(), e))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ApiError::io(dir.display().to_string(), e))?;
        match entry_from_path(&entry.path()) {
            Ok(file_entry) => out.push(file_entry),
            Err(_) => continue,
        }
    }
    out.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => alphanumeric_sort::compare_str(a.name.to_lowercase(), b.name.to_lowercase()),
    });
    Ok(out)
}

/// Stats a single path, file or directory.
pub fn stat(path: &Path) -> Result<FileEntry, ApiError> {
    entry_from_path(path)
}

pub fn create_folder(parent: &Path, name: &str) -> Result<PathBuf, ApiError> {
    validate_name(name)?;
    let new_path = parent.join(name.trim());
    if std::fs::symlink_metadata(&new_path).is_ok() {
        return Err(ApiError::Conflict {
            message: format!("'{name}' already exists"),
        });
    }
    std::fs::create_dir(&new_path).map_err(|e| ApiError::io(new_path.display().to_string(), e))?;
    Ok(new_path)
}

pub fn create_file(parent: &Path, name: &str, content: Option<&str>) -> Result<PathBuf, ApiError> {
    validate_name(name)?;
    let new_path = parent.join(name.trim());
    if std::fs::symlink_metadata(&new_path).is_ok() {
        return Err(ApiError::Conflict {
            message: format!("'{name}' already exists"),
        });
    }
    std::fs::write(&new_path, content.unwrap_or("")).map_err(|e| ApiError::io(new_path.display().to_string(), e))?;
    Ok(new_path)
}

/// Renames (or moves within the same directory) `from` to `to`, refusing to
/// clobber an existing destination — the batch engine is the only place that
/// gets to overwrite, and only when the caller asks for it explicitly.
pub fn rename(from: &Path, to: &Path) -> Result<(), ApiError> {
    if from != to && std::fs::symlink_metadata(to).is_ok() {
        return Err(ApiError::Conflict {
            message: format!("'{}' already exists", to.display()),
        });
    }
    if let Some(parent) = to.parent() {
        check_dir_writable(parent)?;
    }
    std::fs::rename(from, to).map_err(|e| ApiError::io(to.display().to_string(), e))
}

/// Pre-flights a rename/create against the target directory's write
/// permission, so a doomed operation fails with a clear message instead of
/// a raw `EACCES` bubbling up from `rename(2)`.
#[cfg(unix)]
fn check_dir_writable(dir: &Path) -> Result<(), ApiError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return Ok(());
    };
    // SAFETY: c_path is a valid null-terminated C string.
    let result = unsafe { libc::access(c_path.as_ptr(), libc::W_OK) };
    if result != 0 {
        return Err(ApiError::Forbidden {
            message: format!("'{}' is not writable", dir.display()),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_dir_writable(_dir: &Path) -> Result<(), ApiError> {
    Ok(())
}

pub fn read_text(path: &Path) -> Result<String, ApiError> {
    std::fs::read_to_string(path).map_err(|e| ApiError::io(path.display().to_string(), e))
}

pub fn write_text(path: &Path, content: &str) -> Result<(), ApiError> {
    std::fs::write(path, content).map_err(|e| ApiError::io(path.display().to_string(), e))
}

//! Checksums, directory stat aggregation, and copy verification.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ApiError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 digest of a file's contents, read in 64 KiB chunks.
pub fn checksum_file(path: &Path) -> Result<String, ApiError> {
    let mut file = File::open(path).map_err(|e| ApiError::io(path.display().to_string(), e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| ApiError::io(path.display().to_string(), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Recursive walk yielding `(file_count, total_bytes)`. Unreadable subtrees
/// contribute zero and are silently skipped — callers report the per-root
/// outcome separately.
pub fn directory_stats(root: &Path) -> DirectoryStats {
    let mut stats = DirectoryStats::default();
    accumulate_stats(root, &mut stats);
    stats
}

fn accumulate_stats(dir: &Path, stats: &mut DirectoryStats) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            accumulate_stats(&entry.path(), stats);
        } else if let Ok(metadata) = entry.metadata() {
            stats.file_count += 1;
            stats.total_bytes += metadata.len();
        }
    }
}

pub struct VerifyOutcome {
    pub ok: bool,
    pub reason: Option<String>,
}

impl VerifyOutcome {
    fn ok() -> Self {
        Self { ok: true, reason: None }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Verifies a copy succeeded. Files: destination exists, sizes match, and
/// (if requested) digests match. Directories: file counts and aggregate
/// byte sizes match, and (if requested) every source file's digest matches
/// its counterpart at the same relative path.
pub fn verify(src: &Path, dst: &Path, use_checksum: bool) -> Result<VerifyOutcome, ApiError> {
    let src_meta = std::fs::symlink_metadata(src).map_err(|e| ApiError::io(src.display().to_string(), e))?;

    if src_meta.is_dir() {
        return verify_directory(src, dst, use_checksum);
    }

    let Ok(dst_meta) = std::fs::symlink_metadata(dst) else {
        return Ok(VerifyOutcome::fail("destination missing"));
    };

    if src_meta.len() != dst_meta.len() {
        return Ok(VerifyOutcome::fail(format!(
            "size mismatch: {} != {}",
            src_meta.len(),
            dst_meta.len()
        )));
    }

    if use_checksum {
        let src_sum = checksum_file(src)?;
        let dst_sum = checksum_file(dst)?;
        if src_sum != dst_sum {
            return Ok(VerifyOutcome::fail("checksum mismatch"));
        }
    }

    Ok(VerifyOutcome::ok())
}

fn verify_directory(src: &Path, dst: &Path, use_checksum: bool) -> Result<VerifyOutcome, ApiError> {
    if !dst.is_dir() {
        return Ok(VerifyOutcome::fail("destination is not a directory"));
    }

    let src_stats = directory_stats(src);
    let dst_stats = directory_stats(dst);
    if src_stats.file_count != dst_stats.file_count || src_stats.total_bytes != dst_stats.total_bytes {
        return Ok(VerifyOutcome::fail(format!(
            "directory stats mismatch: {} files/{} bytes != {} files/{} bytes",
            src_stats.file_count, src_stats.total_bytes, dst_stats.file_count, dst_stats.total_bytes
        )));
    }

    if use_checksum {
        for entry in walkdir::WalkDir::new(src).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(src) else {
                continue;
            };
            let dst_file = dst.join(relative);
            let src_sum = checksum_file(entry.path())?;
            let dst_sum = checksum_file(&dst_file)?;
            if src_sum != dst_sum {
                return Ok(VerifyOutcome::fail(format!(
                    "checksum mismatch at {}",
                    relative.display()
                )));
            }
        }
    }

    Ok(VerifyOutcome::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn checksum_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let a = checksum_file(&path).unwrap();
        let b = checksum_file(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn directory_stats_counts_recursively() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"12345").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"12").unwrap();
        let stats = directory_stats(dir.path());
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 7);
    }

    #[test]
    fn verify_detects_size_mismatch() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, b"12345").unwrap();
        std::fs::write(&dst, b"1234").unwrap();
        let outcome = verify(&src, &dst, false).unwrap();
        assert!(!outcome.ok);
    }

    #[test]
    fn verify_passes_identical_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, b"identical").unwrap();
        std::fs::write(&dst, b"identical").unwrap();
        let outcome = verify(&src, &dst, true).unwrap();
        assert!(outcome.ok);
    }
}

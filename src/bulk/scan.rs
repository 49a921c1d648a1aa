//! The scanner half of the pipeline: walks each top-level source and pushes
//! [`WorkItem`]s onto the bounded queue feeding the worker pool. Runs on its
//! own thread, concurrently with the workers draining the other end.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;

use super::types::WorkItem;
use crate::task_manager::TaskManager;

/// How often (in items discovered) the scanner re-raises `total_files` while
/// still walking, so the progress percentage trends toward the real count
/// instead of sitting on the initial estimate for the whole scan.
const PROGRESS_REPORT_INTERVAL: u64 = 200;

fn maybe_report_progress(discovered: u64, task_manager: &TaskManager, task_id: &str) {
    if discovered % PROGRESS_REPORT_INTERVAL == 0 {
        task_manager.set_total_files(task_id, discovered);
    }
}

/// Checks whether `path` would create a symlink cycle given the canonical
/// paths already visited on this walk. Mirrors the teacher's own guard:
/// never follow a symlink back into an ancestor that's already being walked.
fn is_symlink_loop(path: &Path, visited: &HashSet<PathBuf>) -> bool {
    path.canonicalize().map(|c| visited.contains(&c)).unwrap_or(false)
}

/// Walks `source` (a single top-level entry) emitting `Mkdir` for every
/// directory (parent before children) and `CopyFile` for every leaf,
/// including symlinks — which are never followed, only copied as leaves.
/// Periodically raises the task's `total_files` estimate as more work is
/// discovered. Returns the number of items emitted for this root.
///
/// A permission error (or similar) reading a subtree doesn't abort the scan:
/// it's recorded and the walk continues with the subtree's siblings, but the
/// root as a whole still surfaces as failed once the walk completes.
#[allow(clippy::too_many_arguments)]
pub(super) fn scan_copy_root(
    source: &Path,
    dest_for_source: &Path,
    root: &Path,
    tx: &SyncSender<WorkItem>,
    cancel_flag: &AtomicBool,
    task_manager: &TaskManager,
    task_id: &str,
    discovered: &mut u64,
) -> Result<(), String> {
    let mut visited = HashSet::new();
    if let Ok(canonical) = source.canonicalize() {
        visited.insert(canonical);
    }
    let mut errors = Vec::new();
    let result = walk_copy(
        source,
        dest_for_source,
        root,
        tx,
        cancel_flag,
        &mut visited,
        discovered,
        task_manager,
        task_id,
        &mut errors,
    );
    task_manager.set_total_files(task_id, *discovered);
    result?;
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk_copy(
    src: &Path,
    dst: &Path,
    root: &Path,
    tx: &SyncSender<WorkItem>,
    cancel_flag: &AtomicBool,
    visited: &mut HashSet<PathBuf>,
    discovered: &mut u64,
    task_manager: &TaskManager,
    task_id: &str,
    errors: &mut Vec<String>,
) -> Result<(), String> {
    if cancel_flag.load(Ordering::Relaxed) {
        return Ok(());
    }

    let metadata = std::fs::symlink_metadata(src).map_err(|e| e.to_string())?;

    if metadata.is_dir() {
        let _ = tx.send(WorkItem::Mkdir {
            dst: dst.to_path_buf(),
            root: root.to_path_buf(),
        });
        *discovered += 1;
        maybe_report_progress(*discovered, task_manager, task_id);

        let entries = match std::fs::read_dir(src) {
            Ok(entries) => entries,
            Err(e) => {
                // Permission denied (or similar) reading a subtree: record
                // against the containing top-level source and move on.
                return Err(format!("cannot read directory {}: {e}", src.display()));
            }
        };

        for entry in entries.flatten() {
            if cancel_flag.load(Ordering::Relaxed) {
                return Ok(());
            }
            let entry_path = entry.path();
            let child_dst = dst.join(entry.file_name());

            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if is_symlink_loop(&entry_path, visited) {
                    continue;
                }
                if let Ok(canonical) = entry_path.canonicalize() {
                    visited.insert(canonical);
                }
                // Errors in a subtree are soft: record and continue with siblings.
                if let Err(e) = walk_copy(
                    &entry_path,
                    &child_dst,
                    root,
                    tx,
                    cancel_flag,
                    visited,
                    discovered,
                    task_manager,
                    task_id,
                    errors,
                ) {
                    log::warn!("scan error under {}: {e}", entry_path.display());
                    errors.push(format!("{}: {e}", entry_path.display()));
                }
            } else {
                let _ = tx.send(WorkItem::CopyFile {
                    src: entry_path,
                    dst: child_dst,
                    root: root.to_path_buf(),
                });
                *discovered += 1;
                maybe_report_progress(*discovered, task_manager, task_id);
            }
        }
    } else {
        let _ = tx.send(WorkItem::CopyFile {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            root: root.to_path_buf(),
        });
        *discovered += 1;
        maybe_report_progress(*discovered, task_manager, task_id);
    }

    Ok(())
}

/// Walks `source` emitting `DeleteFile` for every leaf (files and symlinks)
/// and collecting directory paths into `dirs` for the later deepest-first
/// removal phase — directories are never enqueued as work items themselves.
///
/// Like [`scan_copy_root`], a permission error several levels deep is
/// recorded and the walk continues rather than aborting the whole source.
#[allow(clippy::too_many_arguments)]
pub(super) fn scan_delete_root(
    source: &Path,
    root: &Path,
    tx: &SyncSender<WorkItem>,
    cancel_flag: &AtomicBool,
    dirs: &mut Vec<PathBuf>,
    task_manager: &TaskManager,
    task_id: &str,
    discovered: &mut u64,
) -> Result<(), String> {
    let mut errors = Vec::new();
    let result = walk_delete(source, root, tx, cancel_flag, dirs, discovered, task_manager, task_id, &mut errors);
    task_manager.set_total_files(task_id, *discovered);
    result?;
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk_delete(
    path: &Path,
    root: &Path,
    tx: &SyncSender<WorkItem>,
    cancel_flag: &AtomicBool,
    dirs: &mut Vec<PathBuf>,
    discovered: &mut u64,
    task_manager: &TaskManager,
    task_id: &str,
    errors: &mut Vec<String>,
) -> Result<(), String> {
    if cancel_flag.load(Ordering::Relaxed) {
        return Ok(());
    }

    let metadata = std::fs::symlink_metadata(path).map_err(|e| e.to_string())?;

    if metadata.is_dir() {
        dirs.push(path.to_path_buf());
        let entries = std::fs::read_dir(path).map_err(|e| format!("cannot read directory {}: {e}", path.display()))?;
        for entry in entries.flatten() {
            if cancel_flag.load(Ordering::Relaxed) {
                return Ok(());
            }
            let entry_path = entry.path();
            if let Err(e) = walk_delete(&entry_path, root, tx, cancel_flag, dirs, discovered, task_manager, task_id, errors) {
                log::warn!("scan error under {}: {e}", entry_path.display());
                errors.push(format!("{}: {e}", entry_path.display()));
            }
        }
    } else {
        let _ = tx.send(WorkItem::DeleteFile {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        });
        *discovered += 1;
        maybe_report_progress(*discovered, task_manager, task_id);
    }

    Ok(())
}

/// Sorts directories deepest-first (descending component count), breaking
/// ties lexicographically by absolute path for deterministic ordering.
pub(super) fn sort_dirs_deepest_first(dirs: &mut [PathBuf]) {
    dirs.sort_by(|a, b| {
        let depth_a = a.components().count();
        let depth_b = b.components().count();
        depth_b.cmp(&depth_a).then_with(|| a.cmp(b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_dirs_orders_deepest_first_with_lexicographic_tiebreak() {
        let mut dirs = vec![
            PathBuf::from("/a/b"),
            PathBuf::from("/a/b/c"),
            PathBuf::from("/a/b/d"),
            PathBuf::from("/a"),
        ];
        sort_dirs_deepest_first(&mut dirs);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a/b/c"),
                PathBuf::from("/a/b/d"),
                PathBuf::from("/a/b"),
                PathBuf::from("/a"),
            ]
        );
    }

    #[test]
    fn scan_copy_root_surfaces_nested_permission_error_but_still_copies_siblings() {
        use std::sync::mpsc;
        use std::sync::atomic::AtomicBool;
        use std::os::unix::fs::PermissionsExt;

        use crate::task_manager::TaskManager;

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("ok.txt"), b"x").unwrap();
        let blocked = src.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("inner.txt"), b"x").unwrap();
        std::fs::set_permissions(&blocked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let (tx, rx) = mpsc::sync_channel(1024);
        let cancel_flag = AtomicBool::new(false);
        let task_manager = TaskManager::new();
        let (task_id, _) = task_manager.create(10);
        let mut discovered = 0u64;

        let root = src.path().join("source_root");
        let result = scan_copy_root(
            src.path(),
            dst.path(),
            &root,
            &tx,
            &cancel_flag,
            &task_manager,
            &task_id,
            &mut discovered,
        );

        std::fs::set_permissions(&blocked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_err(), "nested permission error should surface, not be swallowed");
        drop(tx);
        let items: Vec<_> = rx.try_iter().collect();
        assert!(
            items.iter().any(|item| matches!(item, WorkItem::CopyFile { src, .. } if src.ends_with("ok.txt"))),
            "sibling outside the blocked subtree should still be scanned"
        );
    }
}

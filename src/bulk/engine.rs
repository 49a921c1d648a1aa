//! The bulk-operation engine: BatchCopy, BatchMove, BatchDelete.
//!
//! Each runs one scanner thread and N worker threads (drawn from a `rayon`
//! scope so the scanner and workers join together) over a bounded
//! single-producer/multi-consumer queue. The receiving end is wrapped in a
//! `Mutex` so multiple workers can drain it — the teacher's own
//! `run_cancellable` already reaches for `std::sync::mpsc` for this kind of
//! cross-thread polling handoff, so the queue stays on the standard library
//! rather than pulling in an external channel crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};

use crate::error::ApiError;
use crate::ignore_poison::IgnorePoison;
use crate::integrity;
use crate::task_manager::TaskManager;
use crate::volume::Volume;

use super::scan::{scan_copy_root, scan_delete_root, sort_dirs_deepest_first};
use super::types::{BulkRequest, OperationResult, WorkItem};

/// Bounded queue capacity shared by every bulk operation's scan/execute pipeline.
const QUEUE_CAPACITY: usize = 10_000;
/// Conservative per-source work estimate so the progress bar moves before the
/// scanner has discovered the real count.
const INITIAL_ESTIMATE_PER_SOURCE: u64 = 50;

fn worker_count() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    (8 * cpus).min(64)
}

/// Accumulates per-root outcomes and progress while the pipeline runs.
/// `root_errors` stores only the first error observed for a root — the
/// OperationResult reports one entry per top-level source, not per item.
struct EngineStats {
    root_errors: Mutex<HashMap<PathBuf, String>>,
    processed: AtomicU64,
}

impl EngineStats {
    fn new() -> Self {
        Self {
            root_errors: Mutex::new(HashMap::new()),
            processed: AtomicU64::new(0),
        }
    }

    fn record_error(&self, root: &Path, message: impl Into<String>) {
        let mut errors = self.root_errors.lock_ignore_poison();
        errors.entry(root.to_path_buf()).or_insert_with(|| message.into());
    }

    fn finish(&self, sources: &[PathBuf]) -> OperationResult {
        let errors = self.root_errors.lock_ignore_poison();
        let mut result = OperationResult::new();
        for source in sources {
            match errors.get(source) {
                Some(message) => result.push_error(source.display().to_string(), message.clone()),
                None => result.push_success(source.display().to_string()),
            }
        }
        result
    }
}

/// Validates a batch destination: must exist and be a directory. A missing
/// or non-directory destination fails the whole batch, not a single root.
fn validate_batch_destination(destination: &Path) -> Result<(), ApiError> {
    if !destination.exists() {
        return Err(ApiError::NotFound {
            path: destination.display().to_string(),
        });
    }
    if !destination.is_dir() {
        return Err(ApiError::BadRequest {
            message: format!("destination {} is not a directory", destination.display()),
        });
    }
    Ok(())
}

fn preserve_metadata(src: &Path, dst: &Path) {
    if let Ok(metadata) = std::fs::metadata(src) {
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        let _ = filetime::set_file_mtime(dst, mtime);
        #[cfg(unix)]
        {
            let _ = std::fs::set_permissions(dst, metadata.permissions());
        }
    }
}

fn copy_one_file(src: &Path, dst: &Path, overwrite: bool, verify_checksum: bool) -> Result<(), String> {
    if let Some(parent) = dst.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    if dst.symlink_metadata().is_ok() {
        if !overwrite {
            return Err(format!("destination exists: {}", dst.display()));
        }
        if dst.is_dir() {
            std::fs::remove_dir_all(dst).map_err(|e| e.to_string())?;
        } else {
            std::fs::remove_file(dst).map_err(|e| e.to_string())?;
        }
    }

    std::fs::copy(src, dst).map_err(|e| format!("copy failed: {e}"))?;
    preserve_metadata(src, dst);

    if verify_checksum {
        let outcome = integrity::verify(src, dst, true).map_err(|e| e.to_string())?;
        if !outcome.ok {
            return Err(outcome.reason.unwrap_or_else(|| "checksum mismatch".to_string()));
        }
    }

    Ok(())
}

/// Deletes a single local-volume path via the platform trash, falling back
/// to a direct unlink if trash refuses (unsupported volume, sandboxing, etc).
#[cfg(target_os = "linux")]
fn trash_or_unlink(path: &Path) -> std::io::Result<()> {
    if trash::delete(path).is_ok() {
        return Ok(());
    }
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(not(target_os = "linux"))]
fn trash_or_unlink(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn delete_one(path: &Path) -> Result<(), String> {
    let result = match Volume::classify(path) {
        Volume::Local => trash_or_unlink(path),
        Volume::Network => std::fs::remove_file(path),
    };
    result.map_err(|e| e.to_string())
}

/// Removes a directory expected to be empty. Prefers platform trash on local
/// volumes; falls back to a recursive force-delete if new entries appeared
/// concurrently (e.g. a sidecar metadata file written after the scan).
fn rmdir_one(path: &Path) -> Result<(), String> {
    let local = Volume::classify(path).is_local();

    let direct = if local { trash_or_unlink(path) } else { std::fs::remove_dir(path) };

    match direct {
        Ok(()) => Ok(()),
        Err(_) if !local => {
            // Network volume rmdir can fail if the directory isn't actually
            // empty anymore; force-delete and swallow the error per spec.
            let _ = std::fs::remove_dir_all(path);
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Drains `rx` with `worker_count()` workers, applying `execute` to each
/// item. `execute` returns `Err` to record a per-root failure. Joins when
/// the queue is both empty and the scanner has dropped its sender.
fn drain_queue(
    rx: Receiver<WorkItem>,
    cancel_flag: &AtomicBool,
    stats: &EngineStats,
    task_manager: &TaskManager,
    task_id: &str,
    execute: impl Fn(WorkItem) -> Result<(), (PathBuf, String)> + Sync,
) {
    let rx = Arc::new(Mutex::new(rx));
    let n = worker_count();

    rayon::scope(|scope| {
        for _ in 0..n {
            let rx = Arc::clone(&rx);
            let execute = &execute;
            scope.spawn(move |_| {
                loop {
                    if cancel_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let item = {
                        let guard = rx.lock_ignore_poison();
                        guard.recv()
                    };
                    let Ok(item) = item else {
                        // Sender dropped and queue drained: scanner is done.
                        return;
                    };
                    if let Err((root, message)) = execute(item) {
                        stats.record_error(&root, message);
                    }
                    let processed = stats.processed.fetch_add(1, Ordering::Relaxed) + 1;
                    task_manager.update_progress(task_id, processed, None);
                }
            });
        }
    });
}

pub fn execute_copy(
    req: BulkRequest,
    task_manager: &TaskManager,
    task_id: &str,
    cancel_flag: Arc<AtomicBool>,
) -> Result<OperationResult, ApiError> {
    task_manager.set_running(task_id);
    let result = run_copy_phase(req, task_manager, task_id, Arc::clone(&cancel_flag)).map_err(|e| {
        task_manager.fail(task_id, e.to_string());
        e
    })?;
    finalize(task_manager, task_id, &cancel_flag, result)
}

fn finalize(
    task_manager: &TaskManager,
    task_id: &str,
    cancel_flag: &AtomicBool,
    result: OperationResult,
) -> Result<OperationResult, ApiError> {
    if cancel_flag.load(Ordering::Relaxed) {
        task_manager.set_cancelled(task_id);
    } else {
        task_manager.complete(task_id, result.clone());
    }
    Ok(result)
}

/// Runs the copy pipeline without finalizing the task — used directly by
/// [`execute_copy`] and as the first half of [`execute_move`], which needs
/// the task to stay open across both the copy and delete phases.
fn run_copy_phase(
    req: BulkRequest,
    task_manager: &TaskManager,
    task_id: &str,
    cancel_flag: Arc<AtomicBool>,
) -> Result<OperationResult, ApiError> {
    let destination = req.destination.clone().ok_or_else(|| ApiError::BadRequest {
        message: "copy requires a destination".to_string(),
    })?;
    validate_batch_destination(&destination)?;

    task_manager.set_total_files(task_id, req.sources.len() as u64 * INITIAL_ESTIMATE_PER_SOURCE);

    let stats = EngineStats::new();
    let (tx, rx) = mpsc::sync_channel::<WorkItem>(QUEUE_CAPACITY);

    let sources = req.sources.clone();
    let overwrite = req.overwrite;
    let verify_checksum = req.verify_checksum;
    let dest_clone = destination.clone();
    let cancel_for_scan = Arc::clone(&cancel_flag);

    let scanner_task_manager = task_manager.clone();
    let scanner_task_id = task_id.to_string();
    let scanner_stats_errors: Arc<Mutex<HashMap<PathBuf, String>>> = Arc::new(Mutex::new(HashMap::new()));
    let scanner_errors_for_scan = Arc::clone(&scanner_stats_errors);

    let scan_sources = sources.clone();
    let scanner_handle = std::thread::spawn(move || {
        let mut discovered = 0u64;
        for source in &scan_sources {
            if cancel_for_scan.load(Ordering::Relaxed) {
                break;
            }
            if let Err(msg) = validate_copy_root(source, &dest_clone) {
                scanner_errors_for_scan
                    .lock_ignore_poison()
                    .insert(source.clone(), msg);
                continue;
            }
            let dest_for_source = dest_clone.join(source.file_name().unwrap_or_default());
            if let Err(msg) = prepare_destination_slot(&dest_for_source, overwrite) {
                scanner_errors_for_scan
                    .lock_ignore_poison()
                    .insert(source.clone(), msg);
                continue;
            }
            if let Err(msg) = scan_copy_root(
                source,
                &dest_for_source,
                source,
                &tx,
                &cancel_for_scan,
                &scanner_task_manager,
                &scanner_task_id,
                &mut discovered,
            ) {
                scanner_errors_for_scan
                    .lock_ignore_poison()
                    .insert(source.clone(), msg);
            }
        }
        // tx dropped here, signaling workers the queue is final.
    });

    drain_queue(rx, &cancel_flag, &stats, task_manager, task_id, move |item| match item {
        WorkItem::Mkdir { dst, root } => std::fs::create_dir_all(&dst).map_err(|e| (root, e.to_string())),
        WorkItem::CopyFile { src, dst, root } => {
            copy_one_file(&src, &dst, overwrite, verify_checksum).map_err(|e| (root, e))
        }
        WorkItem::DeleteFile { path, root } => delete_one(&path).map_err(|e| (root, e)),
        WorkItem::RmdirEmpty { path, root } => rmdir_one(&path).map_err(|e| (root, e)),
    });

    let _ = scanner_handle.join();

    for (root, message) in scanner_stats_errors.lock_ignore_poison().drain() {
        stats.record_error(&root, message);
    }

    Ok(stats.finish(&sources))
}

fn validate_copy_root(source: &Path, destination: &Path) -> Result<(), String> {
    let canonical_source = source.canonicalize().map_err(|_| "source not found".to_string())?;

    if source.is_dir() {
        let canonical_dest = destination.canonicalize().unwrap_or_else(|_| destination.to_path_buf());
        if canonical_dest.starts_with(&canonical_source) {
            return Err("destination is inside source".to_string());
        }
    }

    let file_name = source.file_name().ok_or_else(|| "invalid source path".to_string())?;
    let dest_for_source = destination.join(file_name);
    if let Ok(canonical_dest_for_source) = dest_for_source.canonicalize()
        && canonical_dest_for_source == canonical_source
    {
        return Err("source and destination are the same file".to_string());
    }

    Ok(())
}

fn prepare_destination_slot(dest_for_source: &Path, overwrite: bool) -> Result<(), String> {
    if dest_for_source.symlink_metadata().is_ok() {
        if !overwrite {
            return Err(format!("destination exists: {}", dest_for_source.display()));
        }
        if dest_for_source.is_dir() {
            std::fs::remove_dir_all(dest_for_source).map_err(|e| e.to_string())?;
        } else {
            std::fs::remove_file(dest_for_source).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

pub fn execute_delete(
    req: BulkRequest,
    task_manager: &TaskManager,
    task_id: &str,
    cancel_flag: Arc<AtomicBool>,
) -> Result<OperationResult, ApiError> {
    task_manager.set_running(task_id);
    let result = run_delete_phase(req, task_manager, task_id, Arc::clone(&cancel_flag)).map_err(|e| {
        task_manager.fail(task_id, e.to_string());
        e
    })?;
    finalize(task_manager, task_id, &cancel_flag, result)
}

/// Runs the delete pipeline (file-delete phase then directory-removal join
/// barrier) without finalizing the task — shared by [`execute_delete`] and
/// the second half of [`execute_move`].
fn run_delete_phase(
    req: BulkRequest,
    task_manager: &TaskManager,
    task_id: &str,
    cancel_flag: Arc<AtomicBool>,
) -> Result<OperationResult, ApiError> {
    task_manager.set_total_files(task_id, req.sources.len() as u64 * INITIAL_ESTIMATE_PER_SOURCE);

    let stats = EngineStats::new();
    let (tx, rx) = mpsc::sync_channel::<WorkItem>(QUEUE_CAPACITY);

    let sources = req.sources.clone();
    let cancel_for_scan = Arc::clone(&cancel_flag);
    let scanner_task_manager = task_manager.clone();
    let scanner_task_id = task_id.to_string();

    let dirs: Arc<Mutex<Vec<(PathBuf, PathBuf)>>> = Arc::new(Mutex::new(Vec::new()));
    let dirs_for_scan = Arc::clone(&dirs);
    let scan_errors: Arc<Mutex<HashMap<PathBuf, String>>> = Arc::new(Mutex::new(HashMap::new()));
    let scan_errors_for_scan = Arc::clone(&scan_errors);

    let scan_sources = sources.clone();
    let scanner_handle = std::thread::spawn(move || {
        let mut discovered = 0u64;
        for source in &scan_sources {
            if cancel_for_scan.load(Ordering::Relaxed) {
                break;
            }
            let mut root_dirs = Vec::new();
            if let Err(msg) = scan_delete_root(
                source,
                source,
                &tx,
                &cancel_for_scan,
                &mut root_dirs,
                &scanner_task_manager,
                &scanner_task_id,
                &mut discovered,
            ) {
                scan_errors_for_scan
                    .lock_ignore_poison()
                    .insert(source.clone(), msg);
            }
            let mut dirs_guard = dirs_for_scan.lock_ignore_poison();
            dirs_guard.extend(root_dirs.into_iter().map(|d| (d, source.clone())));
        }
    });

    drain_queue(rx, &cancel_flag, &stats, task_manager, task_id, move |item| match item {
        WorkItem::DeleteFile { path, root } => delete_one(&path).map_err(|e| (root, e)),
        other => unreachable!("delete scanner never emits {other:?}"),
    });

    let _ = scanner_handle.join();

    for (root, message) in scan_errors.lock_ignore_poison().drain() {
        stats.record_error(&root, message);
    }

    // Directory-removal phase: a strict join barrier after all file deletions.
    if !cancel_flag.load(Ordering::Relaxed) {
        let mut dir_entries = dirs.lock_ignore_poison().clone();
        let mut paths: Vec<PathBuf> = dir_entries.iter().map(|(p, _)| p.clone()).collect();
        sort_dirs_deepest_first(&mut paths);
        let root_by_dir: HashMap<PathBuf, PathBuf> = dir_entries.drain(..).collect();

        for dir in paths {
            if cancel_flag.load(Ordering::Relaxed) {
                break;
            }
            if let Err(message) = rmdir_one(&dir)
                && let Some(root) = root_by_dir.get(&dir)
            {
                stats.record_error(root, message);
            }
        }
    }

    Ok(stats.finish(&sources))
}

/// Runs BatchCopy to completion, then deletes every top-level source whose
/// subtree copied without error. Sources with any copy error are left
/// intact. `total_files` is planned as 2× the discovered count (copy half +
/// delete half) — `execute_copy` and the delete phase below each refine it.
pub fn execute_move(
    req: BulkRequest,
    task_manager: &TaskManager,
    task_id: &str,
    cancel_flag: Arc<AtomicBool>,
) -> Result<OperationResult, ApiError> {
    task_manager.set_running(task_id);

    let copy_result = run_copy_phase(req, task_manager, task_id, Arc::clone(&cancel_flag)).map_err(|e| {
        task_manager.fail(task_id, e.to_string());
        e
    })?;

    if cancel_flag.load(Ordering::Relaxed) {
        return finalize(task_manager, task_id, &cancel_flag, copy_result);
    }

    let succeeded_sources: Vec<PathBuf> = copy_result
        .results
        .iter()
        .filter(|r| matches!(r.status, super::types::ItemStatus::Success))
        .map(|r| PathBuf::from(&r.path))
        .collect();

    if succeeded_sources.is_empty() {
        return finalize(task_manager, task_id, &cancel_flag, copy_result);
    }

    let delete_req = BulkRequest {
        sources: succeeded_sources,
        destination: None,
        overwrite: false,
        verify_checksum: false,
    };

    // Re-enter the pipeline for the delete half on the same task id, so
    // progress keeps accumulating on one Task (spec's "total_files = 2 x
    // discovered", refined by each phase's own scanner).
    let delete_result = run_delete_phase(delete_req, task_manager, task_id, Arc::clone(&cancel_flag))?;

    let mut combined = OperationResult::new();
    for source in copy_result.results.iter().map(|r| r.path.clone()) {
        let copy_entry = copy_result.results.iter().find(|r| r.path == source);
        let delete_entry = delete_result.results.iter().find(|r| r.path == source);
        match (copy_entry, delete_entry) {
            (_, Some(d)) => match &d.status {
                super::types::ItemStatus::Success => combined.push_success(source),
                super::types::ItemStatus::Error => combined.push_error(source, d.message.clone().unwrap_or_default()),
            },
            (Some(c), None) => {
                // Copy failed this root before the delete phase ran for it.
                combined.push_error(source, c.message.clone().unwrap_or_else(|| "move failed".to_string()));
            }
            (None, None) => combined.push_error(source, "move failed".to_string()),
        }
    }

    finalize(task_manager, task_id, &cancel_flag, combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::types::ItemStatus;
    use tempfile::tempdir;

    fn new_task(task_manager: &TaskManager) -> (String, Arc<AtomicBool>) {
        task_manager.create(1)
    }

    #[test]
    fn copy_collision_without_overwrite_fails_that_item() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"A").unwrap();
        std::fs::write(out.join("a.txt"), b"B").unwrap();

        let task_manager = TaskManager::new();
        let (task_id, cancel_flag) = new_task(&task_manager);

        let req = BulkRequest {
            sources: vec![dir.path().join("a.txt")],
            destination: Some(out.clone()),
            overwrite: false,
            verify_checksum: false,
        };
        let result = execute_copy(req, &task_manager, &task_id, cancel_flag).unwrap();

        assert_eq!(result.success_count, 0);
        assert_eq!(result.fail_count, 1);
        assert!(matches!(result.results[0].status, ItemStatus::Error));
        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"B");
    }

    #[test]
    fn move_with_checksum_verification_succeeds() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive");
        std::fs::create_dir(&archive).unwrap();
        let data = vec![7u8; 1024];
        std::fs::write(dir.path().join("big.bin"), &data).unwrap();

        let task_manager = TaskManager::new();
        let (task_id, cancel_flag) = new_task(&task_manager);

        let req = BulkRequest {
            sources: vec![dir.path().join("big.bin")],
            destination: Some(archive.clone()),
            overwrite: false,
            verify_checksum: true,
        };
        let result = execute_move(req, &task_manager, &task_id, cancel_flag).unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(result.fail_count, 0);
        assert!(!dir.path().join("big.bin").exists());
        assert_eq!(std::fs::read(archive.join("big.bin")).unwrap(), data);
    }

    #[test]
    fn move_into_own_subdirectory_is_rejected() {
        let dir = tempdir().unwrap();
        let x = dir.path().join("X");
        std::fs::create_dir(&x).unwrap();
        let sub = x.join("sub");
        std::fs::create_dir(&sub).unwrap();

        let task_manager = TaskManager::new();
        let (task_id, cancel_flag) = new_task(&task_manager);

        let req = BulkRequest {
            sources: vec![x.clone()],
            destination: Some(sub.clone()),
            overwrite: false,
            verify_checksum: false,
        };
        let result = execute_move(req, &task_manager, &task_id, cancel_flag).unwrap();

        assert_eq!(result.fail_count, 1);
        assert!(x.exists());
        assert!(sub.exists());
    }

    #[test]
    fn delete_removes_entire_subtree() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doomed");
        std::fs::create_dir_all(target.join("nested")).unwrap();
        std::fs::write(target.join("a.txt"), b"1").unwrap();
        std::fs::write(target.join("nested/b.txt"), b"2").unwrap();

        let task_manager = TaskManager::new();
        let (task_id, cancel_flag) = new_task(&task_manager);

        let req = BulkRequest {
            sources: vec![target.clone()],
            destination: None,
            overwrite: false,
            verify_checksum: false,
        };
        let result = execute_delete(req, &task_manager, &task_id, cancel_flag).unwrap();

        assert_eq!(result.success_count, 1);
        assert!(!target.exists());
    }

    #[test]
    fn empty_directory_copy_is_a_success_with_no_files() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let task_manager = TaskManager::new();
        let (task_id, cancel_flag) = new_task(&task_manager);

        let req = BulkRequest {
            sources: vec![empty],
            destination: Some(out.clone()),
            overwrite: false,
            verify_checksum: false,
        };
        let result = execute_copy(req, &task_manager, &task_id, cancel_flag).unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(result.fail_count, 0);
        assert!(out.join("empty").is_dir());
    }
}

//! Job registry: per-task state, progress, and cooperative cancellation.
//!
//! An explicit, owned `TaskManager` rather than a process-wide singleton —
//! one instance lives in `AppState`, created once at startup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bulk::types::OperationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_file: Option<String>,
    pub total_files: u64,
    pub processed_files: u64,
    pub cancelled: bool,
    pub error_message: Option<String>,
    pub result: Option<OperationResult>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl Task {
    fn new(id: String, total_files: u64) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            progress: 0,
            current_file: None,
            total_files,
            processed_files: 0,
            cancelled: false,
            error_message: None,
            result: None,
            created_at: now_unix(),
            completed_at: None,
        }
    }

    fn recompute_progress(&mut self) {
        if self.status == TaskStatus::Completed {
            self.progress = 100;
        } else if self.total_files > 0 {
            let ratio = (self.processed_files as f64 / self.total_files as f64) * 100.0;
            self.progress = ratio.floor().clamp(0.0, 100.0) as u8;
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Per-task mutable state plus the orthogonal cancellation flag, shared with
/// the engine that's executing it so cancellation is observable without
/// going back through the registry lock.
struct TaskEntry {
    task: RwLock<Task>,
    cancel_flag: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct TaskManager {
    tasks: Arc<RwLock<HashMap<String, Arc<TaskEntry>>>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a new task in `pending` state with a conservative initial
    /// `total_files` estimate, returning its id and a cancellation handle
    /// the engine should poll.
    pub fn create(&self, total_files: u64) -> (String, Arc<AtomicBool>) {
        let id = Uuid::new_v4().to_string();
        let entry = Arc::new(TaskEntry {
            task: RwLock::new(Task::new(id.clone(), total_files)),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        });
        let cancel_flag = entry.cancel_flag.clone();
        self.tasks.write().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), entry);
        (id, cancel_flag)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let entry = tasks.get(id)?;
        Some(entry.task.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    pub fn set_running(&self, id: &str) {
        self.with_task(id, |task| {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Running;
            }
        });
    }

    /// Safe to call at high frequency; workers are responsible for
    /// throttling their own call rate.
    pub fn update_progress(&self, id: &str, processed_files: u64, current_file: Option<String>) {
        self.with_task(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.processed_files = task.processed_files.max(processed_files);
            task.current_file = current_file;
            task.recompute_progress();
        });
    }

    /// Raises the running total as the scanner discovers more work, so the
    /// progress percentage trends toward truth instead of jumping at the end.
    pub fn set_total_files(&self, id: &str, total_files: u64) {
        self.with_task(id, |task| {
            if !task.status.is_terminal() {
                task.total_files = task.total_files.max(total_files);
                task.recompute_progress();
            }
        });
    }

    pub fn complete(&self, id: &str, result: OperationResult) {
        self.with_task(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.completed_at = Some(now_unix());
            task.recompute_progress();
        });
    }

    pub fn fail(&self, id: &str, message: String) {
        self.with_task(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.status = TaskStatus::Error;
            task.error_message = Some(message);
            task.completed_at = Some(now_unix());
        });
    }

    pub fn set_cancelled(&self, id: &str) {
        self.with_task(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(now_unix());
        });
    }

    /// Flips the cancellation flag. Idempotent: returns `false` if the task
    /// is already terminal or unknown.
    pub fn cancel(&self, id: &str) -> bool {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = tasks.get(id) else {
            return false;
        };
        let task = entry.task.read().unwrap_or_else(|e| e.into_inner());
        if task.status.is_terminal() {
            return false;
        }
        drop(task);
        entry.cancel_flag.store(true, Ordering::Relaxed);
        true
    }

    pub fn is_cancelled(&self, id: &str) -> bool {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks
            .get(id)
            .map(|entry| entry.cancel_flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Evicts terminal tasks older than `max_age` past their `completed_at`.
    pub fn gc(&self, max_age: Duration) {
        let now = now_unix();
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, entry| {
            let task = entry.task.read().unwrap_or_else(|e| e.into_inner());
            match task.completed_at {
                Some(completed_at) => now.saturating_sub(completed_at) < max_age.as_secs(),
                None => true,
            }
        });
    }

    fn with_task(&self, id: &str, f: impl FnOnce(&mut Task)) {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = tasks.get(id) {
            let mut task = entry.task.write().unwrap_or_else(|e| e.into_inner());
            f(&mut task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::types::OperationResult;

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let manager = TaskManager::new();
        let (id, _) = manager.create(10);
        manager.update_progress(&id, 3, None);
        assert_eq!(manager.get(&id).unwrap().progress, 30);
        manager.update_progress(&id, 10, None);
        assert_eq!(manager.get(&id).unwrap().progress, 100);
    }

    #[test]
    fn complete_forces_progress_to_100() {
        let manager = TaskManager::new();
        let (id, _) = manager.create(10);
        manager.update_progress(&id, 1, None);
        manager.complete(
            &id,
            OperationResult {
                status: "completed".to_string(),
                success_count: 1,
                fail_count: 0,
                results: vec![],
            },
        );
        assert_eq!(manager.get(&id).unwrap().progress, 100);
    }

    #[test]
    fn terminal_state_is_monotonic() {
        let manager = TaskManager::new();
        let (id, _) = manager.create(1);
        manager.fail(&id, "boom".to_string());
        manager.set_cancelled(&id);
        let task = manager.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn cancel_is_idempotent() {
        let manager = TaskManager::new();
        let (id, _) = manager.create(1);
        assert!(manager.cancel(&id));
        assert!(manager.cancel(&id));
        manager.set_cancelled(&id);
        assert!(!manager.cancel(&id));
    }

    #[test]
    fn gc_removes_only_old_terminal_tasks() {
        let manager = TaskManager::new();
        let (id, _) = manager.create(1);
        manager.fail(&id, "x".to_string());
        manager.gc(Duration::from_secs(0));
        assert!(manager.get(&id).is_none());
    }

    #[test]
    fn gc_keeps_running_tasks() {
        let manager = TaskManager::new();
        let (id, _) = manager.create(1);
        manager.gc(Duration::from_secs(0));
        assert!(manager.get(&id).is_some());
    }
}

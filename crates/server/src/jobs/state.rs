// crates/server/src/jobs/state.rs
//! Atomic progress tracking for the refresh worker.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use super::types::{RefreshProgress, RefreshStatus, RefreshTask};

/// Counters are lock-free; the last task and error strings sit behind a
/// `RwLock` that is never held across an await.
#[derive(Debug)]
pub struct RefreshState {
    status: AtomicU8,
    queued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    last_task: RwLock<Option<String>>,
    last_error: RwLock<Option<String>>,
}

impl RefreshState {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RefreshStatus::Idle as u8),
            queued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_task: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn task_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_started(&self, task: &RefreshTask) {
        self.status.store(RefreshStatus::Running as u8, Ordering::Relaxed);
        match self.last_task.write() {
            Ok(mut guard) => *guard = Some(format!("{} {}", task.label(), task.server())),
            Err(e) => tracing::error!("RwLock poisoned writing last task: {e}"),
        }
    }

    pub fn task_succeeded(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.status.store(RefreshStatus::Idle as u8, Ordering::Relaxed);
    }

    pub fn task_failed(&self, error: impl Into<String>) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.status.store(RefreshStatus::Idle as u8, Ordering::Relaxed);
        match self.last_error.write() {
            Ok(mut guard) => *guard = Some(error.into()),
            Err(e) => tracing::error!("RwLock poisoned writing last error: {e}"),
        }
    }

    pub fn status(&self) -> RefreshStatus {
        match self.status.load(Ordering::Relaxed) {
            1 => RefreshStatus::Running,
            _ => RefreshStatus::Idle,
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RefreshProgress {
        let read = |lock: &RwLock<Option<String>>| match lock.read() {
            Ok(g) => g.clone(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading refresh state: {e}");
                None
            }
        };
        RefreshProgress {
            status: match self.status() {
                RefreshStatus::Idle => "idle".into(),
                RefreshStatus::Running => "running".into(),
            },
            queued: self.queued.load(Ordering::Relaxed),
            completed: self.completed(),
            failed: self.failed(),
            last_task: read(&self.last_task),
            last_error: read(&self.last_error),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Default for RefreshState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropstats_core::Server;

    #[test]
    fn test_refresh_state_lifecycle() {
        let state = RefreshState::new();
        let snap = state.snapshot();
        assert_eq!(snap.status, "idle");
        assert_eq!((snap.queued, snap.completed, snap.failed), (0, 0, 0));

        state.task_queued();
        state.task_started(&RefreshTask::CurrentMatrix(Server::Us));
        assert_eq!(state.status(), RefreshStatus::Running);
        assert_eq!(state.snapshot().last_task, Some("current_matrix US".to_string()));

        state.task_succeeded();
        assert_eq!(state.status(), RefreshStatus::Idle);
        assert_eq!(state.completed(), 1);
    }

    #[test]
    fn test_refresh_state_failure() {
        let state = RefreshState::new();
        state.task_started(&RefreshTask::PastMatrix(Server::Cn));
        state.task_failed("Aggregation failed: disk I/O error");
        let snap = state.snapshot();
        assert_eq!(snap.status, "idle");
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.last_error, Some("Aggregation failed: disk I/O error".to_string()));
    }
}

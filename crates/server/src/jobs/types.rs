// crates/server/src/jobs/types.rs
//! Types for the refresh job system.

use dropstats_core::{MatrixKind, Server};
use serde::Serialize;

/// One recomputation of a cached matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTask {
    CurrentMatrix(Server),
    PastMatrix(Server),
    Trend { server: Server, interval: i64, range: i64 },
}

impl RefreshTask {
    pub fn server(&self) -> Server {
        match self {
            RefreshTask::CurrentMatrix(server) | RefreshTask::PastMatrix(server) => *server,
            RefreshTask::Trend { server, .. } => *server,
        }
    }

    /// Cache slot the result replaces: (kind, is_past).
    pub fn slot(&self) -> (MatrixKind, bool) {
        match self {
            RefreshTask::CurrentMatrix(_) => (MatrixKind::Regular, false),
            RefreshTask::PastMatrix(_) => (MatrixKind::Regular, true),
            RefreshTask::Trend { .. } => (MatrixKind::Segmented, false),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefreshTask::CurrentMatrix(_) => "current_matrix",
            RefreshTask::PastMatrix(_) => "past_matrix",
            RefreshTask::Trend { .. } => "trend",
        }
    }
}

/// Status of the refresh worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefreshStatus {
    Idle = 0,
    Running = 1,
}

/// Snapshot of refresh progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshProgress {
    pub status: String,
    pub queued: u64,
    pub completed: u64,
    pub failed: u64,
    pub last_task: Option<String>,
    pub last_error: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_slots() {
        assert_eq!(RefreshTask::CurrentMatrix(Server::Cn).slot(), (MatrixKind::Regular, false));
        assert_eq!(RefreshTask::PastMatrix(Server::Cn).slot(), (MatrixKind::Regular, true));
        let trend = RefreshTask::Trend {
            server: Server::Jp,
            interval: 1,
            range: 10,
        };
        assert_eq!(trend.slot(), (MatrixKind::Segmented, false));
        assert_eq!(trend.server(), Server::Jp);
        assert_eq!(trend.label(), "trend");
    }

    #[test]
    fn test_progress_serialize() {
        let progress = RefreshProgress {
            status: "running".to_string(),
            queued: 4,
            completed: 3,
            failed: 0,
            last_task: Some("current_matrix CN".to_string()),
            last_error: None,
            timestamp: "2026-02-05T12:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"lastTask\":\"current_matrix CN\""));
        assert!(json.contains("\"completed\":3"));
    }
}

// crates/server/src/lib.rs
//! Dropstats server library.
//!
//! Wires the matrix engine to its SQLite collaborators, runs the background
//! refresh of cached matrices and exposes the read-side [`MatrixService`].

pub mod config;
pub mod jobs;
pub mod service;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use service::{AdvancedQuery, AdvancedResult, MatrixRequest, MatrixResponse, MatrixService};
pub use state::AppState;

use std::sync::Arc;
use tokio::task::JoinHandle;

use dropstats_core::{ConfigProvider, MatrixStore};
use jobs::RefreshHandle;

/// Channel capacity of the refresh worker: two loops times every server,
/// plus startup seeding.
const REFRESH_QUEUE_CAPACITY: usize = 16;

/// Background refresh machinery. Dropping it does not stop the tasks; call
/// [`RefreshRuntime::shutdown`].
pub struct RefreshRuntime {
    pub handle: RefreshHandle,
    worker: JoinHandle<()>,
    loops: Vec<JoinHandle<()>>,
}

impl RefreshRuntime {
    /// Stop the loops, then let the worker finish its queue.
    pub async fn shutdown(self) {
        for l in &self.loops {
            l.abort();
        }
        drop(self.handle);
        drop(self.loops);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "Refresh worker ended abnormally");
        }
    }
}

/// Start the worker, queue past matrices missing from the cache, and spawn
/// the periodic loops.
pub async fn start_refresh(state: &Arc<AppState>) -> RefreshRuntime {
    let (handle, worker) = state.refresh_worker().spawn(REFRESH_QUEUE_CAPACITY);

    let store: Arc<dyn MatrixStore> = state.db.clone();
    jobs::seed_past_matrices(&store, &handle).await;

    let config: Arc<dyn ConfigProvider> = state.db.clone();
    let loops = jobs::spawn_all(&config, handle.clone(), &state.config).await;

    RefreshRuntime { handle, worker, loops }
}

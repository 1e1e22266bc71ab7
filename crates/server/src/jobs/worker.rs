// crates/server/src/jobs/worker.rs
//! Single consumer that recomputes cached matrices.
//!
//! Producers (scheduler loops, startup seeding, external triggers) push
//! [`RefreshTask`]s onto a bounded channel through a [`RefreshHandle`]. The
//! worker runs them one at a time; a failed task is logged and counted and
//! never stops the loop.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use dropstats_core::{now_millis, MatrixEngine, MatrixResult, MatrixStore};

use super::state::RefreshState;
use super::types::RefreshTask;

pub struct RefreshWorker {
    engine: MatrixEngine,
    store: Arc<dyn MatrixStore>,
    state: Arc<RefreshState>,
}

impl RefreshWorker {
    pub fn new(engine: MatrixEngine, store: Arc<dyn MatrixStore>, state: Arc<RefreshState>) -> Self {
        Self { engine, store, state }
    }

    /// Recompute one matrix and replace its cache slot. Returns the number
    /// of elements written.
    pub async fn run_task(&self, task: &RefreshTask) -> MatrixResult<usize> {
        let now = now_millis();
        let elements = match task {
            RefreshTask::CurrentMatrix(server) => {
                self.engine.compute_global_matrix(*server, None, false, now).await?
            }
            RefreshTask::PastMatrix(server) => self.engine.compute_global_matrix(*server, None, true, now).await?,
            RefreshTask::Trend {
                server,
                interval,
                range,
            } => {
                self.engine
                    .compute_global_trend(*server, *interval, *range, now)
                    .await?
            }
        };
        let (kind, is_past) = task.slot();
        let written = elements.len();
        self.store.replace(kind, task.server(), is_past, elements).await?;
        Ok(written)
    }

    /// Spawn the consumer loop. It exits once every handle is dropped.
    pub fn spawn(self, capacity: usize) -> (RefreshHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<RefreshTask>(capacity.max(1));
        let handle = RefreshHandle {
            tx,
            state: self.state.clone(),
        };

        let join = tokio::spawn(async move {
            info!(capacity, "Refresh worker started");
            while let Some(task) = rx.recv().await {
                self.state.task_started(&task);
                let started = Instant::now();
                match self.run_task(&task).await {
                    Ok(written) => {
                        self.state.task_succeeded();
                        info!(
                            task = task.label(),
                            server = %task.server(),
                            elements = written,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Refresh task finished"
                        );
                    }
                    Err(err) => {
                        error!(task = task.label(), server = %task.server(), error = %err, "Refresh task failed");
                        self.state.task_failed(err.to_string());
                    }
                }
            }
            info!("Refresh worker stopped");
        });

        (handle, join)
    }
}

/// Producer side of the refresh channel. Cheap to clone.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshTask>,
    state: Arc<RefreshState>,
}

impl RefreshHandle {
    #[cfg(test)]
    pub(crate) fn from_parts(tx: mpsc::Sender<RefreshTask>, state: Arc<RefreshState>) -> Self {
        Self { tx, state }
    }

    /// Queue a task, waiting for channel capacity. Returns `false` once the
    /// worker is gone.
    pub async fn enqueue(&self, task: RefreshTask) -> bool {
        let label = task.label();
        let server = task.server();
        match self.tx.send(task).await {
            Ok(()) => {
                self.state.task_queued();
                true
            }
            Err(_) => {
                warn!(task = label, server = %server, "Refresh worker closed, task dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn state(&self) -> &Arc<RefreshState> {
        &self.state
    }
}

// crates/server/src/state.rs
//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dropstats_core::{now_millis, LastUpdateTimes, MatrixEngine, MatrixError, MatrixResult, Server, UpdateKey};
use dropstats_db::Database;

use crate::config::ServerConfig;
use crate::jobs::{RefreshHandle, RefreshState, RefreshTask, RefreshWorker};
use crate::service::MatrixService;

/// Everything the serving layer and the background jobs share.
pub struct AppState {
    /// Process start, for uptime.
    pub start_time: Instant,
    pub db: Arc<Database>,
    pub config: ServerConfig,
    /// Freshness stamps of every global result. Empty at boot.
    pub last_updates: Arc<LastUpdateTimes>,
    pub engine: MatrixEngine,
    pub service: MatrixService,
    /// Refresh worker progress (lock-free counters).
    pub refresh: Arc<RefreshState>,
}

impl AppState {
    /// Wire the engine, service and refresh state over one database.
    pub fn new(db: Arc<Database>, config: ServerConfig) -> Arc<Self> {
        let last_updates = Arc::new(LastUpdateTimes::new());
        let engine = MatrixEngine::new(db.clone(), db.clone(), db.clone(), last_updates.clone());
        let service = MatrixService::new(engine.clone(), db.clone(), config.retry_delay, config.query_timeout);
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            config,
            last_updates,
            engine,
            service,
            refresh: Arc::new(RefreshState::new()),
        })
    }

    /// A worker writing into this state's database and reporting into
    /// `self.refresh`.
    pub fn refresh_worker(&self) -> RefreshWorker {
        RefreshWorker::new(self.engine.clone(), self.db.clone(), self.refresh.clone())
    }

    /// Queue a past-matrix recomputation, e.g. after drop info changed.
    pub async fn refresh_past_matrix(&self, handle: &RefreshHandle, server: Server) -> bool {
        handle.enqueue(RefreshTask::PastMatrix(server)).await
    }

    /// Clear count per stage over all time, or over the trailing `range` ms.
    pub async fn total_stage_times(&self, server: Server, range: Option<i64>) -> MatrixResult<HashMap<String, i64>> {
        let now = now_millis();
        let totals = self
            .db
            .total_stage_times(server, range, now)
            .await
            .map_err(MatrixError::aggregation)?;
        self.last_updates.record(UpdateKey::TotalStageTimes { server, range }, now);
        Ok(totals)
    }

    /// Quantity per item over all time.
    pub async fn total_item_quantities(&self, server: Server) -> MatrixResult<HashMap<String, i64>> {
        let now = now_millis();
        let totals = self
            .db
            .total_item_quantities(server)
            .await
            .map_err(MatrixError::aggregation)?;
        self.last_updates.record(UpdateKey::TotalItemQuantities(server), now);
        Ok(totals)
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

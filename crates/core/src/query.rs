// crates/core/src/query.rs
//! Query kinds and their single dispatch point.
//!
//! Every query the serving layer can run is a [`MatrixQuery`] variant; the
//! engine executes one with an optional wall-clock budget, or a batch where
//! each query fails on its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

use crate::element::DropMatrixElement;
use crate::engine::MatrixEngine;
use crate::error::{MatrixError, MatrixResult};
use crate::planner::split_time_ranges;
use crate::provider::ConfigKey;
use crate::segmented::{section_count, SegmentRequest};
use crate::types::{now_millis, Server};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MatrixQuery {
    /// Past or current matrix over the latest accumulatable windows.
    #[serde(rename_all = "camelCase")]
    GlobalMatrix {
        server: Server,
        user_id: Option<String>,
        is_past: bool,
    },
    /// One stage over an arbitrary span, folded or (with `interval`) segmented.
    #[serde(rename_all = "camelCase")]
    Custom {
        server: Server,
        stage_id: String,
        #[serde(default)]
        item_ids: Vec<String>,
        start: i64,
        end: Option<i64>,
        #[serde(default)]
        user_ids: Vec<String>,
        interval: Option<i64>,
    },
    /// Segmented matrix over the trailing `range` for every stage.
    #[serde(rename_all = "camelCase")]
    GlobalTrend { server: Server, interval: i64, range: i64 },
}

impl MatrixQuery {
    pub fn server(&self) -> Server {
        match self {
            MatrixQuery::GlobalMatrix { server, .. }
            | MatrixQuery::Custom { server, .. }
            | MatrixQuery::GlobalTrend { server, .. } => *server,
        }
    }

    /// Restrict the query to one user's observations. Trends are global only
    /// and come back unchanged.
    pub fn with_user(self, user: &str) -> Self {
        match self {
            MatrixQuery::GlobalMatrix { server, is_past, .. } => MatrixQuery::GlobalMatrix {
                server,
                user_id: Some(user.to_string()),
                is_past,
            },
            MatrixQuery::Custom {
                server,
                stage_id,
                item_ids,
                start,
                end,
                interval,
                ..
            } => MatrixQuery::Custom {
                server,
                stage_id,
                item_ids,
                start,
                end,
                user_ids: vec![user.to_string()],
                interval,
            },
            trend @ MatrixQuery::GlobalTrend { .. } => trend,
        }
    }
}

impl MatrixEngine {
    /// Run one query, bounded by `timeout` when given.
    pub async fn execute(&self, query: &MatrixQuery, timeout: Option<Duration>) -> MatrixResult<Vec<DropMatrixElement>> {
        match timeout {
            Some(budget) => tokio::time::timeout(budget, self.dispatch(query))
                .await
                .map_err(|_| MatrixError::Timeout(budget))?,
            None => self.dispatch(query).await,
        }
    }

    async fn dispatch(&self, query: &MatrixQuery) -> MatrixResult<Vec<DropMatrixElement>> {
        let now = now_millis();
        match query {
            MatrixQuery::GlobalMatrix {
                server,
                user_id,
                is_past,
            } => {
                self.compute_global_matrix(*server, user_id.as_deref(), *is_past, now)
                    .await
            }
            MatrixQuery::Custom {
                server,
                stage_id,
                item_ids,
                start,
                end,
                user_ids,
                interval: None,
            } => {
                if end.is_some_and(|end| end <= *start) {
                    return Err(MatrixError::InvalidQuery(format!(
                        "end {end:?} is not after start {start}"
                    )));
                }
                let records = self.drop_info.time_ranges(*server).await?;
                let mut stage_windows = BTreeMap::new();
                stage_windows.insert(stage_id.clone(), split_time_ranges(&records, stage_id, *start, *end));
                self.compute_elements(*server, &stage_windows, item_ids, user_ids, now)
                    .await
            }
            MatrixQuery::Custom {
                server,
                stage_id,
                item_ids,
                start,
                end,
                user_ids,
                interval: Some(interval),
            } => {
                if *interval > 0 && section_count(*start, end.unwrap_or(now), *interval).is_none() {
                    return Err(MatrixError::InvalidQuery(format!(
                        "span from {start} to {end:?} in steps of {interval} overflows"
                    )));
                }
                let request = SegmentRequest {
                    server: *server,
                    stage_id: Some(stage_id.clone()),
                    item_ids: item_ids.clone(),
                    start: *start,
                    end: *end,
                    user_ids: user_ids.clone(),
                    interval: *interval,
                };
                self.compute_segments(&request, now).await
            }
            MatrixQuery::GlobalTrend {
                server,
                interval,
                range,
            } => self.compute_global_trend(*server, *interval, *range, now).await,
        }
    }

    /// Run every query on its own; failures are logged and left out.
    ///
    /// Successful results are paired with the index of their query.
    pub async fn execute_batch(
        &self,
        queries: &[MatrixQuery],
        timeout: Option<Duration>,
    ) -> Vec<(usize, Vec<DropMatrixElement>)> {
        let mut results = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            match self.execute(query, timeout).await {
                Ok(elements) => results.push((index, elements)),
                Err(err) if err.is_timeout() => {
                    error!(index, server = %query.server(), error = %err, "Timeout in batch query");
                }
                Err(err) => {
                    error!(index, server = %query.server(), error = %err, "Error in batch query");
                }
            }
        }
        results
    }

    /// Batch entry point with the configured size cap and per-query timeout.
    ///
    /// `default_timeout` applies when the timeout key is not configured.
    pub async fn execute_advanced(
        &self,
        queries: &[MatrixQuery],
        default_timeout: Duration,
    ) -> MatrixResult<Vec<(usize, Vec<DropMatrixElement>)>> {
        if let Some(max) = self.config.get_i64(ConfigKey::AdvancedQueryRequestNumMax).await {
            let max = usize::try_from(max).unwrap_or(0);
            if queries.len() > max {
                return Err(MatrixError::TooManyQueries {
                    requested: queries.len(),
                    max,
                });
            }
        }
        let timeout = self
            .timeout_for(ConfigKey::AdvancedQueryTimeout)
            .await
            .unwrap_or(default_timeout);
        Ok(self.execute_batch(queries, Some(timeout)).await)
    }

    /// Configured timeout in seconds for `key`, if any.
    pub async fn timeout_for(&self, key: ConfigKey) -> Option<Duration> {
        let secs = self.config.get_i64(key).await;
        if secs.is_none() {
            debug!(key = key.as_str(), "Config key missing, using default timeout");
        }
        secs.and_then(|s| u64::try_from(s).ok()).map(Duration::from_secs)
    }
}

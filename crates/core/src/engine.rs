// crates/core/src/engine.rs
//! Matrix aggregation engine.
//!
//! Windows are queried in synchronized passes: pass `i` asks the raw
//! executor, in one call, for the `i`th window of every stage that has one.
//! Each pass's rows are validated against the stage's drop set, items that
//! never dropped are zero-filled, and after all passes the per-window
//! elements of each (stage, item) are folded into one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::conditions::QueryConditions;
use crate::element::{fold_by_key, DropMatrixElement};
use crate::error::MatrixResult;
use crate::freshness::{LastUpdateTimes, UpdateKey};
use crate::planner::{latest_max_accumulatable_ranges, pass_count, plan_windows};
use crate::provider::{ConfigProvider, DropInfoProvider, RawAggregator};
use crate::time_range::TimeRange;
use crate::types::{AggregateRow, Server};

/// Stage id → positional window list, one slot per pass.
pub type StageWindows = BTreeMap<String, Vec<TimeRange>>;

/// Stateless engine over injected collaborators. Cheap to clone.
#[derive(Clone)]
pub struct MatrixEngine {
    pub(crate) aggregator: Arc<dyn RawAggregator>,
    pub(crate) drop_info: Arc<dyn DropInfoProvider>,
    pub(crate) config: Arc<dyn ConfigProvider>,
    pub(crate) last_updates: Arc<LastUpdateTimes>,
}

impl MatrixEngine {
    pub fn new(
        aggregator: Arc<dyn RawAggregator>,
        drop_info: Arc<dyn DropInfoProvider>,
        config: Arc<dyn ConfigProvider>,
        last_updates: Arc<LastUpdateTimes>,
    ) -> Self {
        Self {
            aggregator,
            drop_info,
            config,
            last_updates,
        }
    }

    pub fn drop_info(&self) -> &Arc<dyn DropInfoProvider> {
        &self.drop_info
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    pub fn last_updates(&self) -> &Arc<LastUpdateTimes> {
        &self.last_updates
    }

    /// Aggregate every stage's windows and fold the result per (stage, item).
    ///
    /// An empty `item_filter` means all items; empty `user_ids` means all users.
    pub async fn compute_elements(
        &self,
        server: Server,
        stage_windows: &StageWindows,
        item_filter: &[String],
        user_ids: &[String],
        now: i64,
    ) -> MatrixResult<Vec<DropMatrixElement>> {
        let passes = stage_windows.values().map(Vec::len).max().unwrap_or(0);
        let mut all = Vec::new();
        for i in 0..passes {
            let windows: BTreeMap<&str, &TimeRange> = stage_windows
                .iter()
                .filter_map(|(stage_id, ranges)| ranges.get(i).map(|r| (stage_id.as_str(), r)))
                .collect();
            all.extend(self.run_pass(server, &windows, item_filter, user_ids, now).await?);
        }
        Ok(fold_by_key(all, now))
    }

    /// Past (`is_past`) or current matrix over the latest maximal
    /// accumulatable windows, optionally for a single user.
    pub async fn compute_global_matrix(
        &self,
        server: Server,
        user_id: Option<&str>,
        is_past: bool,
        now: i64,
    ) -> MatrixResult<Vec<DropMatrixElement>> {
        let started = Instant::now();
        let records = self.drop_info.time_ranges(server).await?;
        let plan = plan_windows(&latest_max_accumulatable_ranges(&records), now, is_past);
        let user_ids: Vec<String> = user_id.map(str::to_string).into_iter().collect();

        let mut all = Vec::new();
        for i in 0..pass_count(&plan) {
            let planned: BTreeMap<&str, _> = plan
                .iter()
                .filter_map(|(stage_id, windows)| windows.get(i).map(|w| (stage_id.as_str(), w)))
                .collect();
            let windows: BTreeMap<&str, &TimeRange> = planned.iter().map(|(s, w)| (*s, &w.range)).collect();

            let elements = self.run_pass(server, &windows, &[], &user_ids, now).await?;
            all.extend(elements.into_iter().filter(|el| {
                planned
                    .get(el.stage_id.as_str())
                    .is_some_and(|w| w.item_ids.contains(&el.item_id))
            }));
        }
        let result = fold_by_key(all, now);

        if user_id.is_none() {
            let key = if is_past {
                UpdateKey::PastMatrix(server)
            } else {
                UpdateKey::CurrentMatrix(server)
            };
            self.last_updates.record(key, now);
            info!(
                server = %server,
                is_past,
                elements = result.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Global drop matrix computed"
            );
        }
        Ok(result)
    }

    /// One executor call for one window per stage, validated and zero-filled.
    async fn run_pass(
        &self,
        server: Server,
        windows: &BTreeMap<&str, &TimeRange>,
        item_filter: &[String],
        user_ids: &[String],
        now: i64,
    ) -> MatrixResult<Vec<DropMatrixElement>> {
        if windows.is_empty() {
            return Ok(Vec::new());
        }
        let mut conditions = QueryConditions::new()
            .server(server)
            .user_ids(user_ids.iter().cloned())
            .item_ids(item_filter.iter().cloned());
        for (stage_id, range) in windows {
            conditions = conditions.stage_range(stage_id, range);
        }

        let rows = self.aggregator.aggregate(&conditions).await?;
        let mut rows_by_stage: HashMap<&str, Vec<&AggregateRow>> = HashMap::new();
        for row in &rows {
            rows_by_stage.entry(row.stage_id.as_str()).or_default().push(row);
        }

        let mut elements = Vec::new();
        for (stage_id, range) in windows {
            let stage_rows = rows_by_stage.remove(stage_id).unwrap_or_default();
            // Every row of one stage/window group carries the group's clear count.
            let stage_times = stage_rows.first().map_or(0, |row| row.times);
            let mut drop_set = self.drop_info.drop_set(server, stage_id, range.start).await?;

            for row in &stage_rows {
                let Some(item_id) = row.item_id.as_deref() else {
                    continue;
                };
                if !drop_set.remove(item_id) {
                    warn!(
                        server = %server,
                        stage_id = *stage_id,
                        item_id,
                        window = %range,
                        "Item is invalid in stage, discarding observed drops"
                    );
                    continue;
                }
                elements.push(DropMatrixElement::new(*stage_id, item_id, row.quantity, row.times, range, now));
            }

            let mut missing: Vec<String> = drop_set
                .into_iter()
                .filter(|item_id| item_filter.is_empty() || item_filter.contains(item_id))
                .collect();
            missing.sort();
            for item_id in missing {
                elements.push(DropMatrixElement::new(*stage_id, item_id, 0, stage_times, range, now));
            }
        }

        if !rows_by_stage.is_empty() {
            debug!(
                stages = ?rows_by_stage.keys().collect::<Vec<_>>(),
                "Ignoring rows for stages outside the requested windows"
            );
        }
        Ok(elements)
    }
}

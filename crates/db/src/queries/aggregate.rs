//! Raw aggregation executor over `item_drops`.
//!
//! Clears are summed once per stage (and section) group; item quantities are
//! summed per item and joined back onto their group, so every row of a group
//! repeats the group's clear count. Groups with clears but no matching items
//! come back as a single row without an item.

use async_trait::async_trait;
use dropstats_core::{now_millis, AggregateRow, MatrixResult, QueryConditions, RawAggregator};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::{Database, DbResult};

type RawRow = (String, Option<String>, i64, i64, Option<i64>);

/// Append the observation filter for `conditions` to `qb`.
fn append_filters<'args>(qb: &mut QueryBuilder<'args, Sqlite>, conditions: &'args QueryConditions, now: i64) {
    qb.push(" WHERE d.is_reliable = 1 AND d.is_deleted = 0");

    if let Some(server) = conditions.server {
        qb.push(" AND d.server = ");
        qb.push_bind(server.as_str());
    }

    if !conditions.user_ids.is_empty() {
        qb.push(" AND d.user_id IN (");
        let mut sep = qb.separated(", ");
        for user_id in &conditions.user_ids {
            sep.push_bind(user_id.as_str());
        }
        sep.push_unseparated(")");
    }

    if let Some(range) = conditions.range {
        qb.push(" AND d.timestamp >= ");
        qb.push_bind(now - range);
    }

    // One disjunct per stage window; a window without a stage matches all stages.
    if !conditions.stages.is_empty() {
        qb.push(" AND (");
        for (i, window) in conditions.stages.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("(d.timestamp >= ");
            qb.push_bind(window.start);
            if let Some(end) = window.end {
                qb.push(" AND d.timestamp < ");
                qb.push_bind(end);
            }
            if let Some(stage_id) = &window.stage_id {
                qb.push(" AND d.stage_id = ");
                qb.push_bind(stage_id.as_str());
            }
            qb.push(")");
        }
        qb.push(")");
    }
}

impl Database {
    /// Grouped sums for `conditions`, evaluated at instant `now`.
    ///
    /// In bucketed mode sections are counted from the first stage window's
    /// start, or from the lookback start when no window is given.
    pub async fn aggregate_item_drops(&self, conditions: &QueryConditions, now: i64) -> DbResult<Vec<AggregateRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("WITH filtered AS (SELECT d.id, d.stage_id, d.times, ");
        match conditions.interval {
            Some(interval) => {
                let origin = conditions
                    .stages
                    .first()
                    .map(|w| w.start)
                    .or(conditions.range.map(|r| now - r))
                    .unwrap_or(0);
                qb.push("(d.timestamp - ");
                qb.push_bind(origin);
                qb.push(") / ");
                qb.push_bind(interval);
                qb.push(" AS section");
            }
            None => {
                qb.push("CAST(NULL AS INTEGER) AS section");
            }
        }
        qb.push(" FROM item_drops d");
        append_filters(&mut qb, conditions, now);
        qb.push(
            "), stage_times AS (
                SELECT stage_id, section, SUM(times) AS times FROM filtered GROUP BY stage_id, section
            ), item_quantities AS (
                SELECT f.stage_id, f.section, i.item_id, SUM(i.quantity) AS quantity
                FROM filtered f JOIN item_drop_items i ON i.drop_id = f.id",
        );
        if !conditions.item_ids.is_empty() {
            qb.push(" WHERE i.item_id IN (");
            let mut sep = qb.separated(", ");
            for item_id in &conditions.item_ids {
                sep.push_bind(item_id.as_str());
            }
            sep.push_unseparated(")");
        }
        qb.push(
            " GROUP BY f.stage_id, f.section, i.item_id
            )
            SELECT s.stage_id, q.item_id, COALESCE(q.quantity, 0), s.times, s.section
            FROM stage_times s
            LEFT JOIN item_quantities q ON q.stage_id = s.stage_id AND q.section IS s.section
            ORDER BY s.stage_id, s.section, q.item_id",
        );

        let rows: Vec<RawRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        debug!(rows = rows.len(), bucketed = conditions.is_bucketed(), "Aggregated item drops");
        Ok(rows
            .into_iter()
            .map(|(stage_id, item_id, quantity, times, section)| AggregateRow {
                stage_id,
                item_id,
                quantity,
                times,
                section,
            })
            .collect())
    }
}

#[async_trait]
impl RawAggregator for Database {
    async fn aggregate(&self, conditions: &QueryConditions) -> MatrixResult<Vec<AggregateRow>> {
        self.aggregate_item_drops(conditions, now_millis())
            .await
            .map_err(|e| e.into_aggregation())
    }
}

//! Stored accumulation windows, and the drop sets and open stages they imply.

use async_trait::async_trait;
use dropstats_core::{DropInfoProvider, MatrixResult, Server, StageItemRange, TimeRange};
use std::collections::HashSet;

use crate::{Database, DbResult};

type DropInfoRow = (String, String, i64, Option<i64>, bool, Option<String>);

impl Database {
    /// Store one accumulation window of an item in a stage.
    pub async fn insert_drop_info(&self, server: Server, record: &StageItemRange) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO drop_infos (server, stage_id, item_id, range_start, range_end, accumulatable, comment)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(server.as_str())
        .bind(&record.stage_id)
        .bind(&record.item_id)
        .bind(record.range.start)
        .bind(record.range.end)
        .bind(record.range.accumulatable)
        .bind(record.range.comment.as_deref())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Every stored window of `server`, ordered by stage, item and start.
    pub async fn list_drop_infos(&self, server: Server) -> DbResult<Vec<StageItemRange>> {
        let rows: Vec<DropInfoRow> = sqlx::query_as(
            "SELECT stage_id, item_id, range_start, range_end, accumulatable, comment
             FROM drop_infos WHERE server = ?
             ORDER BY stage_id, item_id, range_start",
        )
        .bind(server.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(stage_id, item_id, start, end, accumulatable, comment)| {
                let mut range = TimeRange::new(start, end).with_accumulatable(accumulatable);
                range.comment = comment;
                StageItemRange::new(stage_id, item_id, range)
            })
            .collect())
    }

    /// Items whose window in `stage_id` contains `at`.
    pub async fn drop_set_at(&self, server: Server, stage_id: &str, at: i64) -> DbResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT item_id FROM drop_infos
             WHERE server = ? AND stage_id = ? AND range_start <= ? AND (range_end IS NULL OR range_end > ?)",
        )
        .bind(server.as_str())
        .bind(stage_id)
        .bind(at)
        .bind(at)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(item_id,)| item_id).collect())
    }

    /// Stages with at least one window containing `at`.
    pub async fn opening_stages_at(&self, server: Server, at: i64) -> DbResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT stage_id FROM drop_infos
             WHERE server = ? AND range_start <= ? AND (range_end IS NULL OR range_end > ?)",
        )
        .bind(server.as_str())
        .bind(at)
        .bind(at)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(stage_id,)| stage_id).collect())
    }
}

#[async_trait]
impl DropInfoProvider for Database {
    async fn drop_set(&self, server: Server, stage_id: &str, at: i64) -> MatrixResult<HashSet<String>> {
        self.drop_set_at(server, stage_id, at)
            .await
            .map_err(|e| e.into_collaborator())
    }

    async fn opening_stages(&self, server: Server, at: i64) -> MatrixResult<HashSet<String>> {
        self.opening_stages_at(server, at)
            .await
            .map_err(|e| e.into_collaborator())
    }

    async fn time_ranges(&self, server: Server) -> MatrixResult<Vec<StageItemRange>> {
        self.list_drop_infos(server).await.map_err(|e| e.into_collaborator())
    }
}

//! Drop observation ingest and whole-server totals.

use crate::{Database, DbError, DbResult};
use dropstats_core::Server;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One upload: `times` clears of a stage and what dropped across them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItemDrop {
    pub server: Server,
    pub stage_id: String,
    pub user_id: String,
    pub timestamp: i64,
    pub times: i64,
    pub is_reliable: bool,
    /// (item id, quantity) pairs.
    pub drops: Vec<(String, i64)>,
}

impl NewItemDrop {
    /// A reliable single clear with no drops yet.
    pub fn new(server: Server, stage_id: &str, user_id: &str, timestamp: i64) -> Self {
        Self {
            server,
            stage_id: stage_id.to_string(),
            user_id: user_id.to_string(),
            timestamp,
            times: 1,
            is_reliable: true,
            drops: Vec::new(),
        }
    }

    pub fn with_drop(mut self, item_id: &str, quantity: i64) -> Self {
        self.drops.push((item_id.to_string(), quantity));
        self
    }

    pub fn with_times(mut self, times: i64) -> Self {
        self.times = times;
        self
    }

    pub fn unreliable(mut self) -> Self {
        self.is_reliable = false;
        self
    }
}

impl Database {
    /// Store one observation and its per-item quantities. Returns its id.
    pub async fn insert_item_drop(&self, drop: &NewItemDrop) -> DbResult<i64> {
        let mut tx = self.pool().begin().await?;
        let id = sqlx::query(
            "INSERT INTO item_drops (server, stage_id, user_id, timestamp, times, is_reliable)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(drop.server.as_str())
        .bind(&drop.stage_id)
        .bind(&drop.user_id)
        .bind(drop.timestamp)
        .bind(drop.times)
        .bind(drop.is_reliable)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (item_id, quantity) in &drop.drops {
            sqlx::query(
                "INSERT INTO item_drop_items (drop_id, item_id, quantity) VALUES (?, ?, ?)
                 ON CONFLICT(drop_id, item_id) DO UPDATE SET quantity = quantity + excluded.quantity",
            )
            .bind(id)
            .bind(item_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    /// Soft-delete an observation owned by `user_id`.
    ///
    /// Another user's observation is reported as not found.
    pub async fn delete_item_drop(&self, user_id: &str, drop_id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE item_drops SET is_deleted = 1 WHERE id = ? AND user_id = ?")
            .bind(drop_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "ItemDrop[{drop_id}] for user with ID[{user_id}]"
            )));
        }
        Ok(())
    }

    /// Soft-delete the user's most recent visible observation, which must be
    /// `drop_id`.
    pub async fn recall_item_drop(&self, user_id: &str, drop_id: i64) -> DbResult<()> {
        let latest: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM item_drops WHERE user_id = ? AND is_deleted = 0
             ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        match latest {
            None => Err(DbError::NotFound(format!("Visible ItemDrop for user with ID[{user_id}]"))),
            Some((latest,)) if latest != drop_id => Err(DbError::NotFound(format!(
                "ItemDrop[{drop_id}] as the latest upload of user with ID[{user_id}]"
            ))),
            Some(_) => self.delete_item_drop(user_id, drop_id).await,
        }
    }

    /// Clears per stage over reliable, visible observations, optionally only
    /// within the trailing `range` milliseconds before `now`.
    pub async fn total_stage_times(&self, server: Server, range: Option<i64>, now: i64) -> DbResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT stage_id, SUM(times) FROM item_drops
             WHERE server = ? AND is_reliable = 1 AND is_deleted = 0
               AND (? IS NULL OR timestamp >= ?)
             GROUP BY stage_id",
        )
        .bind(server.as_str())
        .bind(range)
        .bind(range.map(|r| now - r))
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Quantity per item over reliable, visible observations.
    pub async fn total_item_quantities(&self, server: Server) -> DbResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT i.item_id, SUM(i.quantity) FROM item_drop_items i
             JOIN item_drops d ON d.id = i.drop_id
             WHERE d.server = ? AND d.is_reliable = 1 AND d.is_deleted = 0
             GROUP BY i.item_id",
        )
        .bind(server.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_merges_repeated_items() {
        let db = Database::new_in_memory().await.unwrap();
        let drop = NewItemDrop::new(Server::Cn, "main_01-07", "u1", 100)
            .with_drop("30012", 1)
            .with_drop("30012", 2);
        let id = db.insert_item_drop(&drop).await.unwrap();

        let (quantity,): (i64,) = sqlx::query_as("SELECT quantity FROM item_drop_items WHERE drop_id = ?")
            .bind(id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(quantity, 3);
    }

    #[tokio::test]
    async fn test_delete_checks_owner() {
        let db = Database::new_in_memory().await.unwrap();
        let id = db
            .insert_item_drop(&NewItemDrop::new(Server::Cn, "main_01-07", "u1", 100))
            .await
            .unwrap();

        assert!(matches!(db.delete_item_drop("u2", id).await, Err(DbError::NotFound(_))));
        db.delete_item_drop("u1", id).await.unwrap();
        assert!(db.total_stage_times(Server::Cn, None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recall_only_latest() {
        let db = Database::new_in_memory().await.unwrap();
        let first = db
            .insert_item_drop(&NewItemDrop::new(Server::Cn, "s", "u1", 100))
            .await
            .unwrap();
        let second = db
            .insert_item_drop(&NewItemDrop::new(Server::Cn, "s", "u1", 200))
            .await
            .unwrap();

        assert!(db.recall_item_drop("u1", first).await.is_err());
        db.recall_item_drop("u1", second).await.unwrap();
        db.recall_item_drop("u1", first).await.unwrap();
        assert!(matches!(db.recall_item_drop("u1", first).await, Err(DbError::NotFound(_))));
    }
}

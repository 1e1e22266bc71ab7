//! Cached matrices, one row set per (kind, server, is_past).

use async_trait::async_trait;
use dropstats_core::{DropMatrixElement, MatrixKind, MatrixResult, MatrixStore, Server};
use tracing::debug;

use crate::{Database, DbResult};

type ElementRow = (String, String, i64, Option<i64>, i64, i64, i64);

impl Database {
    pub async fn load_matrix(&self, kind: MatrixKind, server: Server, is_past: bool) -> DbResult<Vec<DropMatrixElement>> {
        let rows: Vec<ElementRow> = sqlx::query_as(
            "SELECT stage_id, item_id, range_start, range_end, quantity, times, update_time
             FROM drop_matrix_elements
             WHERE kind = ? AND server = ? AND is_past = ?
             ORDER BY range_start, stage_id, item_id",
        )
        .bind(kind.as_str())
        .bind(server.as_str())
        .bind(is_past)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(stage_id, item_id, start, end, quantity, times, update_time)| DropMatrixElement {
                stage_id,
                item_id,
                quantity,
                times,
                start,
                end,
                update_time,
            })
            .collect())
    }

    /// Delete then insert the rows of one key inside a single transaction.
    pub async fn replace_matrix(
        &self,
        kind: MatrixKind,
        server: Server,
        is_past: bool,
        elements: &[DropMatrixElement],
    ) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;
        let deleted = sqlx::query("DELETE FROM drop_matrix_elements WHERE kind = ? AND server = ? AND is_past = ?")
            .bind(kind.as_str())
            .bind(server.as_str())
            .bind(is_past)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for el in elements {
            sqlx::query(
                "INSERT INTO drop_matrix_elements
                 (kind, server, is_past, stage_id, item_id, range_start, range_end, quantity, times, update_time)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(kind.as_str())
            .bind(server.as_str())
            .bind(is_past)
            .bind(&el.stage_id)
            .bind(&el.item_id)
            .bind(el.start)
            .bind(el.end)
            .bind(el.quantity)
            .bind(el.times)
            .bind(el.update_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(
            kind = kind.as_str(),
            server = %server,
            is_past,
            deleted,
            inserted = elements.len(),
            "Replaced cached matrix"
        );
        Ok(())
    }
}

#[async_trait]
impl MatrixStore for Database {
    async fn load(&self, kind: MatrixKind, server: Server, is_past: bool) -> MatrixResult<Vec<DropMatrixElement>> {
        self.load_matrix(kind, server, is_past)
            .await
            .map_err(|e| e.into_collaborator())
    }

    async fn replace(
        &self,
        kind: MatrixKind,
        server: Server,
        is_past: bool,
        elements: Vec<DropMatrixElement>,
    ) -> MatrixResult<()> {
        self.replace_matrix(kind, server, is_past, &elements)
            .await
            .map_err(|e| e.into_collaborator())
    }
}

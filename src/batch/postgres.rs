//! PostgreSQL batch store.
//!
//! Progress advances run inside a transaction with `SELECT ... FOR UPDATE`, so
//! the count-and-status update is atomic even when ticks overlap.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{EngineError, Result};

use super::{derive_status, Batch, BatchId, BatchStatus, BatchStore, Progress};

/// Run the engine's schema migrations against `pool`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| EngineError::Internal(format!("migration failed: {e}")))
}

/// PostgreSQL implementation of the [`BatchStore`] trait.
#[derive(Clone)]
pub struct PostgresBatchStore {
    pool: PgPool,
}

impl PostgresBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_batch(row: &sqlx::postgres::PgRow) -> Result<Batch> {
    let status: String = row.get("status");
    Ok(Batch {
        id: BatchId(row.get::<Uuid, _>("id")),
        queue_name: row.get("queue_name"),
        items_total: row.get::<i64, _>("items_total") as u64,
        items_processed: row.get::<i64, _>("items_processed") as u64,
        status: status.parse().map_err(EngineError::Internal)?,
        run_at: row.get("run_at"),
        created_at: row.get("created_at"),
    })
}

impl BatchStore for PostgresBatchStore {
    async fn insert(&self, batch: Batch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batches (id, queue_name, items_total, items_processed, status, run_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(batch.id.0)
        .bind(&batch.queue_name)
        .bind(batch.items_total as i64)
        .bind(batch.items_processed as i64)
        .bind(batch.status.as_str())
        .bind(batch.run_at)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: BatchId) -> Result<Option<Batch>> {
        let row = sqlx::query(
            r#"
            SELECT id, queue_name, items_total, items_processed, status, run_at, created_at
            FROM batches
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_batch).transpose()
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue_name, items_total, items_processed, status, run_at, created_at
            FROM batches
            WHERE status IN ('pending', 'running')
                AND run_at <= $1
            ORDER BY run_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_batch).collect()
    }

    async fn advance_progress(&self, id: BatchId, delta: u64) -> Result<Progress> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT items_total, items_processed, status
            FROM batches
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::BatchNotFound(id))?;

        let items_total = row.get::<i64, _>("items_total") as u64;
        let old_processed = row.get::<i64, _>("items_processed") as u64;
        let old_status: BatchStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(EngineError::Internal)?;

        let items_processed = (old_processed + delta).min(items_total);
        let status = derive_status(items_processed, items_total);

        sqlx::query(
            r#"
            UPDATE batches
            SET items_processed = $2, status = $3
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(items_processed as i64)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Progress {
            items_total,
            items_processed,
            status,
            just_completed: old_status != BatchStatus::Completed && status == BatchStatus::Completed,
        })
    }
}

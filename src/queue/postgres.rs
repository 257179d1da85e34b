//! PostgreSQL queue store.
//!
//! The claim path is a single `UPDATE ... WHERE id = (SELECT ... FOR UPDATE
//! SKIP LOCKED) RETURNING` statement, so the lease compare-and-swap holds
//! across processes: concurrent claimers skip each other's locked rows instead
//! of blocking or double-claiming.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::batch::BatchId;
use crate::error::{EngineError, Result};

use super::{ItemId, QueueItem, QueueStore};

/// PostgreSQL implementation of the [`QueueStore`] trait.
#[derive(Clone)]
pub struct PostgresQueueStore {
    pool: PgPool,
    claim_interval: Duration,
}

impl PostgresQueueStore {
    /// Create a store whose claims are gated on `claim_interval` of item age.
    pub fn new(pool: PgPool, claim_interval: Duration) -> Self {
        Self {
            pool,
            claim_interval,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_item(row: &sqlx::postgres::PgRow) -> QueueItem {
    QueueItem {
        id: row.get::<Uuid, _>("id"),
        queue_name: row.get("queue_name"),
        batch_id: BatchId(row.get::<Uuid, _>("batch_id")),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        lease_expiry: row.get("lease_expiry"),
    }
}

impl QueueStore for PostgresQueueStore {
    async fn enqueue(&self, queue_name: &str, batch_id: BatchId, payload: Value) -> Result<ItemId> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO queue_items (id, queue_name, batch_id, payload, created_at, lease_expiry)
            VALUES ($1, $2, $3, $4, $5, NULL)
            "#,
        )
        .bind(id)
        .bind(queue_name)
        .bind(batch_id.0)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn enqueue_many(
        &self,
        queue_name: &str,
        batch_id: BatchId,
        payloads: Vec<Value>,
    ) -> Result<usize> {
        let now = Utc::now();
        let count = payloads.len();

        let mut tx = self.pool.begin().await?;
        for payload in payloads {
            sqlx::query(
                r#"
                INSERT INTO queue_items (id, queue_name, batch_id, payload, created_at, lease_expiry)
                VALUES ($1, $2, $3, $4, $5, NULL)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(queue_name)
            .bind(batch_id.0)
            .bind(payload)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(count)
    }

    async fn claim(&self, queue_name: &str, lease: Duration) -> Result<Option<QueueItem>> {
        let now = Utc::now();
        let eligible_before = now
            - chrono::Duration::from_std(self.claim_interval)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let lease_expiry = now
            + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero());

        let row = sqlx::query(
            r#"
            UPDATE queue_items
            SET lease_expiry = $1
            WHERE id = (
                SELECT id
                FROM queue_items
                WHERE queue_name = $2
                    AND created_at <= $3
                    AND (lease_expiry IS NULL OR lease_expiry <= $4)
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue_name, batch_id, payload, created_at, lease_expiry
            "#,
        )
        .bind(lease_expiry)
        .bind(queue_name)
        .bind(eligible_before)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_item))
    }

    async fn delete(&self, id: ItemId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM queue_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(EngineError::ItemNotFound(id));
        }
        Ok(())
    }

    async fn release(&self, id: ItemId) -> Result<()> {
        let rows_affected = sqlx::query("UPDATE queue_items SET lease_expiry = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(EngineError::ItemNotFound(id));
        }
        Ok(())
    }

    async fn pending_len(&self, queue_name: &str) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM queue_items WHERE queue_name = $1")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("count") as usize)
    }
}

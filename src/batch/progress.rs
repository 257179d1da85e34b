//! Batch creation and progress updates.
//!
//! All batch mutation funnels through this helper: a batch row is inserted once
//! at submission time and thereafter only its processed count and status change,
//! both derived inside the store's atomic advance.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;

use super::{Batch, BatchId, BatchStatus, BatchStore, Progress};

/// Creates batches and advances their progress counters.
pub struct BatchProgressHelper<B: BatchStore> {
    store: Arc<B>,
}

impl<B: BatchStore> BatchProgressHelper<B> {
    pub fn new(store: Arc<B>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<B> {
        &self.store
    }

    /// Insert a new Pending batch with zero progress and return it.
    pub async fn create_batch(&self, items_total: u64, run_at: DateTime<Utc>) -> Result<Batch> {
        let id = BatchId::new();
        let batch = Batch {
            id,
            queue_name: id.queue_name(),
            items_total,
            items_processed: 0,
            status: BatchStatus::Pending,
            run_at,
            created_at: Utc::now(),
        };

        self.store.insert(batch.clone()).await?;

        tracing::debug!(
            batch_id = %batch.id,
            items_total,
            run_at = %run_at,
            "Created batch"
        );

        Ok(batch)
    }

    /// Advance a batch's processed count by `delta`.
    ///
    /// Safe under repeated calls: the count is clamped to the total and the
    /// status is re-derived from counts on every call. The returned snapshot
    /// reports whether this call caused the Completed transition.
    pub async fn advance(&self, id: BatchId, delta: u64) -> Result<Progress> {
        let progress = self.store.advance_progress(id, delta).await?;

        if progress.just_completed {
            tracing::info!(
                batch_id = %id,
                items_total = progress.items_total,
                "Batch completed"
            );
        }

        Ok(progress)
    }
}

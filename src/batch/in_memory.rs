//! In-memory batch store.
//!
//! Batches live in a concurrent HashMap. Suitable for tests and single-process
//! deployments; state is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{EngineError, Result};

use super::{derive_status, Batch, BatchId, BatchStatus, BatchStore, Progress};

/// In-memory implementation of the [`BatchStore`] trait.
#[derive(Clone, Default)]
pub struct InMemoryBatchStore {
    batches: Arc<RwLock<HashMap<BatchId, Batch>>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchStore for InMemoryBatchStore {
    async fn insert(&self, batch: Batch) -> Result<()> {
        let mut batches = self.batches.write();

        if batches.contains_key(&batch.id) {
            return Err(EngineError::Internal(format!(
                "batch {} already exists",
                batch.id
            )));
        }

        batches.insert(batch.id, batch);
        Ok(())
    }

    async fn get(&self, id: BatchId) -> Result<Option<Batch>> {
        Ok(self.batches.read().get(&id).cloned())
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Batch>> {
        let batches = self.batches.read();

        let mut due: Vec<Batch> = batches
            .values()
            .filter(|b| !b.status.is_terminal() && b.run_at <= now)
            .cloned()
            .collect();

        // Oldest run_at first; id as tie-breaker for a deterministic order
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at).then(a.id.0.cmp(&b.id.0)));
        due.truncate(limit);

        Ok(due)
    }

    async fn advance_progress(&self, id: BatchId, delta: u64) -> Result<Progress> {
        let mut batches = self.batches.write();

        let batch = batches
            .get_mut(&id)
            .ok_or(EngineError::BatchNotFound(id))?;

        let was_completed = batch.status == BatchStatus::Completed;
        batch.items_processed = (batch.items_processed + delta).min(batch.items_total);
        batch.status = derive_status(batch.items_processed, batch.items_total);

        Ok(Progress {
            items_total: batch.items_total,
            items_processed: batch.items_processed,
            status: batch.status,
            just_completed: !was_completed && batch.status == BatchStatus::Completed,
        })
    }
}

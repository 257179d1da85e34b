//! In-memory queue store.
//!
//! Items live in a HashMap behind a single RwLock; the claim path takes the
//! write lock for its whole select-and-lease step, which is what makes the
//! compare-and-swap guarantee hold for concurrent claimers in one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::batch::BatchId;
use crate::error::{EngineError, Result};

use super::{ItemId, QueueItem, QueueStore};

/// In-memory implementation of the [`QueueStore`] trait.
#[derive(Clone)]
pub struct InMemoryQueueStore {
    items: Arc<RwLock<HashMap<ItemId, QueueItem>>>,
    claim_interval: Duration,
}

impl InMemoryQueueStore {
    /// Create a store whose claims are gated on `claim_interval` of item age.
    pub fn new(claim_interval: Duration) -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            claim_interval,
        }
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, queue_name: &str, batch_id: BatchId, payload: Value) -> Result<ItemId> {
        let item = QueueItem {
            id: Uuid::new_v4(),
            queue_name: queue_name.to_string(),
            batch_id,
            payload,
            created_at: Utc::now(),
            lease_expiry: None,
        };
        let id = item.id;

        self.items.write().insert(id, item);
        Ok(id)
    }

    async fn enqueue_many(
        &self,
        queue_name: &str,
        batch_id: BatchId,
        payloads: Vec<Value>,
    ) -> Result<usize> {
        let now = Utc::now();
        let mut items = self.items.write();

        let count = payloads.len();
        for payload in payloads {
            let item = QueueItem {
                id: Uuid::new_v4(),
                queue_name: queue_name.to_string(),
                batch_id,
                payload,
                created_at: now,
                lease_expiry: None,
            };
            items.insert(item.id, item);
        }

        Ok(count)
    }

    async fn claim(&self, queue_name: &str, lease: Duration) -> Result<Option<QueueItem>> {
        let mut items = self.items.write();
        let now = Utc::now();
        let eligible_before = now
            - chrono::Duration::from_std(self.claim_interval)
                .unwrap_or_else(|_| chrono::Duration::zero());

        // Oldest eligible item; id as tie-breaker for a deterministic order
        let candidate = items
            .values()
            .filter(|item| {
                item.queue_name == queue_name
                    && item.created_at <= eligible_before
                    && item.lease_expiry.map_or(true, |expiry| expiry <= now)
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|item| item.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        let item = items
            .get_mut(&id)
            .ok_or(EngineError::ItemNotFound(id))?;
        item.lease_expiry = Some(
            now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero()),
        );

        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: ItemId) -> Result<()> {
        self.items
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::ItemNotFound(id))
    }

    async fn release(&self, id: ItemId) -> Result<()> {
        let mut items = self.items.write();
        let item = items.get_mut(&id).ok_or(EngineError::ItemNotFound(id))?;
        item.lease_expiry = None;
        Ok(())
    }

    async fn pending_len(&self, queue_name: &str) -> Result<usize> {
        let items = self.items.read();
        Ok(items
            .values()
            .filter(|item| item.queue_name == queue_name)
            .count())
    }
}

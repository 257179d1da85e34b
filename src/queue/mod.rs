//! Interval-aware claim/lease queues.
//!
//! Each batch owns a private queue of opaque payloads. An item only becomes
//! claimable once it has aged past the configured interval, and a successful
//! claim takes a time-bounded lease: at most one caller wins an item until its
//! lease expires. Callers must eventually delete (success) or release (retry)
//! every claimed item; a lease left to expire is the crash-recovery path, not
//! the happy path.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::batch::BatchId;
use crate::error::Result;

pub mod in_memory;

#[cfg(feature = "postgres")]
pub mod postgres;


/// Unique identifier for a queue item.
pub type ItemId = Uuid;

/// A queued payload awaiting processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub queue_name: String,
    /// Back-reference to the owning batch (not ownership)
    pub batch_id: BatchId,
    /// Application-defined payload, opaque to the queue
    pub payload: Value,
    /// Insertion time, the input to the interval gate
    pub created_at: DateTime<Utc>,
    /// `None` = unclaimed; a future timestamp = claimed until then
    pub lease_expiry: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Serialized payload size, used for the tick's memory accounting.
    pub fn payload_bytes(&self) -> u64 {
        serde_json::to_vec(&self.payload)
            .map(|b| b.len() as u64)
            .unwrap_or(0)
    }
}

/// Store trait for persisted claim/lease queues.
///
/// Implementations gate claims on item age (`claim_interval`) and guarantee
/// compare-and-swap lease semantics: two concurrent claims never return the
/// same unexpired item.
pub trait QueueStore: Send + Sync {
    /// Insert a single unclaimed item.
    fn enqueue(
        &self,
        queue_name: &str,
        batch_id: BatchId,
        payload: Value,
    ) -> impl Future<Output = Result<ItemId>> + Send;

    /// Insert a group of unclaimed items. Callers enqueue large submissions in
    /// sub-chunks through this method to bound transient memory.
    fn enqueue_many(
        &self,
        queue_name: &str,
        batch_id: BatchId,
        payloads: Vec<Value>,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Claim the oldest eligible item, taking a lease of `lease` duration.
    ///
    /// An item is eligible when it has aged past the store's claim interval and
    /// its lease is absent or expired. Returns `None` when nothing is eligible.
    fn claim(
        &self,
        queue_name: &str,
        lease: Duration,
    ) -> impl Future<Output = Result<Option<QueueItem>>> + Send;

    /// Permanently remove a processed item.
    ///
    /// # Errors
    /// - `ItemNotFound` if the item doesn't exist
    fn delete(&self, id: ItemId) -> impl Future<Output = Result<()>> + Send;

    /// Clear an item's lease, making it immediately reclaimable (retry path).
    ///
    /// # Errors
    /// - `ItemNotFound` if the item doesn't exist
    fn release(&self, id: ItemId) -> impl Future<Output = Result<()>> + Send;

    /// Number of items currently sitting in a queue, leased or not.
    fn pending_len(&self, queue_name: &str) -> impl Future<Output = Result<usize>> + Send;
}

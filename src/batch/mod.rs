//! Batch model and lifecycle tracking.
//!
//! A batch is a tracked unit of work: a fixed item count, a schedule time, and a
//! status that moves Pending -> Running -> Completed and never backward. Batches
//! are retained after completion as an audit trail; the engine never deletes them.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub mod in_memory;
pub mod progress;

#[cfg(feature = "postgres")]
pub mod postgres;


/// Unique identifier for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name of the batch's private queue, derived 1:1 from the id.
    pub fn queue_name(&self) -> String {
        format!("batch_{}", self.0.simple())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// No item has been processed yet
    Pending,
    /// At least one item has been processed
    Running,
    /// Every item has been processed
    Completed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "running" => Ok(BatchStatus::Running),
            "completed" => Ok(BatchStatus::Completed),
            other => Err(format!("unknown batch status: {other}")),
        }
    }
}

/// A tracked batch of queued work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    /// Name of the batch's private queue
    pub queue_name: String,
    /// Item count fixed at creation
    pub items_total: u64,
    /// Monotonically non-decreasing, clamped to `items_total`
    pub items_processed: u64,
    pub status: BatchStatus,
    /// Earliest eligible execution time
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Items still waiting in the batch's queue.
    pub fn remaining(&self) -> u64 {
        self.items_total.saturating_sub(self.items_processed)
    }
}

/// Derive the status a batch should carry for the given counts.
///
/// Status is always recomputed from counts rather than trusted from a cached
/// flag, which keeps repeated progress updates idempotent.
pub(crate) fn derive_status(items_processed: u64, items_total: u64) -> BatchStatus {
    if items_total > 0 && items_processed >= items_total {
        BatchStatus::Completed
    } else if items_processed > 0 {
        BatchStatus::Running
    } else {
        BatchStatus::Pending
    }
}

/// Snapshot returned by a progress advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub items_total: u64,
    pub items_processed: u64,
    pub status: BatchStatus,
    /// True exactly when this call caused the Completed transition,
    /// for one-shot completion hooks.
    pub just_completed: bool,
}

/// Store trait for persisting and querying batches.
pub trait BatchStore: Send + Sync {
    /// Insert a newly created batch.
    ///
    /// # Errors
    /// - If a batch with the same ID already exists
    fn insert(&self, batch: Batch) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a batch by id, or `None` if it does not exist.
    fn get(&self, id: BatchId) -> impl Future<Output = Result<Option<Batch>>> + Send;

    /// Find up to `limit` batches that are due at `now`: status Pending or
    /// Running with `run_at <= now`, oldest `run_at` first.
    fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Batch>>> + Send;

    /// Atomically add `delta` to a batch's processed count, clamped to the
    /// total, and re-derive its status from the new counts.
    ///
    /// # Errors
    /// - `BatchNotFound` if the batch doesn't exist
    fn advance_progress(
        &self,
        id: BatchId,
        delta: u64,
    ) -> impl Future<Output = Result<Progress>> + Send;
}

//! Asynchronous batch/queue reconciliation engine.
//!
//! This crate accepts large, bursty sets of records to reconcile against
//! persistent target entities and:
//! - Estimates memory footprints and auto-chunks oversized submissions
//! - Defers execution behind externally scheduled ticks
//! - Tracks per-batch progress as a Pending -> Running -> Completed state machine
//! - Claims queue items through an interval gate with lease compare-and-swap
//! - Resolves record identity for idempotent create-vs-update decisions
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use reconciler::{
//!     BatchRunner, EngineConfig, InMemoryBatchStore, InMemoryQueueStore,
//!     InMemoryRecordStore, SyncWorker,
//! };
//!
//! let records = Arc::new(InMemoryRecordStore::new());
//! let runner = BatchRunner::new(
//!     Arc::new(InMemoryQueueStore::default()),
//!     Arc::new(InMemoryBatchStore::new()),
//!     Arc::new(SyncWorker::new(records)),
//!     EngineConfig::default(),
//! );
//!
//! // Submit work, then drive the engine from a scheduler
//! let ids = runner.submit(items, chrono::Utc::now(), true).await?;
//! runner.run_tick().await?;
//! ```

pub mod batch;
pub mod capacity;
pub mod config;
pub mod error;
pub mod queue;
pub mod record;
pub mod runner;
pub mod worker;

// Re-export commonly used types
pub use batch::in_memory::InMemoryBatchStore;
pub use batch::progress::BatchProgressHelper;
pub use batch::{Batch, BatchId, BatchStatus, BatchStore, Progress};
pub use capacity::{CapacityCheck, CapacityConfig, CapacityManager, ChunkPlan, MemoryEstimate};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use queue::in_memory::InMemoryQueueStore;
pub use queue::{ItemId, QueueItem, QueueStore};
pub use record::in_memory::InMemoryRecordStore;
pub use record::{OwnerId, Record, RecordChanges, RecordDraft, RecordId, RecordStore};
pub use runner::{BatchRunner, CompletionHook, TickReport};
pub use worker::delete::DeleteWorker;
pub use worker::sync::SyncWorker;
pub use worker::{ActionHint, DeletePayload, ItemOutcome, SyncPayload, Worker};

#[cfg(feature = "postgres")]
pub use batch::postgres::{run_migrations, PostgresBatchStore};
#[cfg(feature = "postgres")]
pub use queue::postgres::PostgresQueueStore;

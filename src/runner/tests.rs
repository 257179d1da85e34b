use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use crate::batch::in_memory::InMemoryBatchStore;
use crate::batch::{Batch, BatchStatus};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::queue::in_memory::InMemoryQueueStore;
use crate::queue::{QueueItem, QueueStore};
use crate::record::in_memory::InMemoryRecordStore;
use crate::record::OwnerId;
use crate::worker::sync::SyncWorker;
use crate::worker::{ItemOutcome, Worker};

use super::{BatchRunner, CompletionHook};

type SyncRunner = BatchRunner<InMemoryQueueStore, InMemoryBatchStore, SyncWorker<InMemoryRecordStore>>;

struct Fixture {
    queue: Arc<InMemoryQueueStore>,
    batches: Arc<InMemoryBatchStore>,
    records: Arc<InMemoryRecordStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            queue: Arc::new(InMemoryQueueStore::new(Duration::ZERO)),
            batches: Arc::new(InMemoryBatchStore::new()),
            records: Arc::new(InMemoryRecordStore::new()),
        }
    }

    fn sync_runner(&self, config: EngineConfig) -> SyncRunner {
        BatchRunner::new(
            self.queue.clone(),
            self.batches.clone(),
            Arc::new(SyncWorker::new(self.records.clone())),
            config,
        )
    }
}

fn sync_items(count: usize) -> Vec<Value> {
    (0..count)
        .map(|n| json!({"owner_id": 1, "unique_key": format!("item-{n}"), "title": format!("Item {n}")}))
        .collect()
}

#[tokio::test]
async fn test_single_batch_completes_in_one_tick() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig::default());

    let ids = runner.submit(sync_items(5), Utc::now(), true).await.unwrap();
    assert_eq!(ids.len(), 1);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Pending);
    assert_eq!(batch.items_total, 5);

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.batches_touched, 1);
    assert_eq!(report.items_processed, 5);
    assert_eq!(report.batches_completed, 1);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.items_processed, 5);

    // Every item was reconciled into the record store
    assert_eq!(fixture.records.len(), 5);
    // The batch's queue is drained
    assert_eq!(
        fixture.queue.pending_len(&batch.queue_name).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_greedy_completion_finishes_remainder() {
    let fixture = Fixture::new();

    // First tick is capped at 3 of the 5 items
    let capped = fixture.sync_runner(EngineConfig {
        items_per_run: 3,
        ..Default::default()
    });
    let ids = capped.submit(sync_items(5), Utc::now(), false).await.unwrap();
    capped.run_tick().await.unwrap();

    let batch = capped.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.items_processed, 3);
    assert_eq!(batch.status, BatchStatus::Running);

    // Remaining 2 fit within a 10-item budget, so the batch finishes this tick
    let roomy = fixture.sync_runner(EngineConfig {
        items_per_run: 10,
        ..Default::default()
    });
    let report = roomy.run_tick().await.unwrap();
    assert_eq!(report.items_processed, 2);
    assert_eq!(report.batches_completed, 1);

    let batch = roomy.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.items_processed, 5);
}

#[tokio::test]
async fn test_future_run_at_defers_execution() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig::default());

    let run_at = Utc::now() + chrono::Duration::hours(1);
    let ids = runner.submit(sync_items(2), run_at, false).await.unwrap();

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.batches_touched, 0);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Pending);
    assert_eq!(batch.items_processed, 0);
}

#[tokio::test]
async fn test_auto_chunk_creates_staggered_batches() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig {
        min_chunk_size: 1,
        max_chunk_size: 2,
        ..Default::default()
    });

    let run_at = Utc::now();
    let ids = runner.submit(sync_items(5), run_at, true).await.unwrap();
    assert_eq!(ids.len(), 3);

    // 2 + 2 + 1 items, run_at staggered one minute apart
    let batches: Vec<Batch> = {
        let mut out = Vec::new();
        for id in &ids {
            out.push(runner.batch_status(*id).await.unwrap());
        }
        out
    };
    assert_eq!(
        batches.iter().map(|b| b.items_total).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    for (index, batch) in batches.iter().enumerate() {
        assert_eq!(batch.run_at, run_at + chrono::Duration::minutes(index as i64));
    }

    // Only the first chunk is due right now
    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.batches_touched, 1);
    assert_eq!(report.items_processed, 2);

    assert_eq!(
        runner.batch_status(ids[0]).await.unwrap().status,
        BatchStatus::Completed
    );
    assert_eq!(
        runner.batch_status(ids[1]).await.unwrap().status,
        BatchStatus::Pending
    );
}

#[tokio::test]
async fn test_auto_chunk_disabled_keeps_one_batch() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig {
        min_chunk_size: 1,
        max_chunk_size: 2,
        ..Default::default()
    });

    let ids = runner.submit(sync_items(5), Utc::now(), false).await.unwrap();
    assert_eq!(ids.len(), 1);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.items_total, 5);
    // Sub-chunked enqueue still lands every item in the one queue
    assert_eq!(
        fixture.queue.pending_len(&batch.queue_name).await.unwrap(),
        5
    );
}

#[tokio::test]
async fn test_empty_submission_creates_nothing() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig::default());

    let ids = runner.submit(Vec::new(), Utc::now(), true).await.unwrap();
    assert!(ids.is_empty());

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.batches_touched, 0);
}

#[tokio::test]
async fn test_memory_ceiling_defers_remaining_groups() {
    let fixture = Fixture::new();
    // Zero-MiB ceiling: the first bulk group is allowed through, every
    // following group check trips and defers to the next tick.
    let runner = fixture.sync_runner(EngineConfig {
        bulk_process_size: 2,
        memory_threshold_mb: 0,
        ..Default::default()
    });

    let ids = runner.submit(sync_items(6), Utc::now(), false).await.unwrap();

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.items_processed, 2);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.items_processed, 2);
    assert_eq!(batch.status, BatchStatus::Running);

    // Later ticks finish the rest
    runner.run_tick().await.unwrap();
    runner.run_tick().await.unwrap();
    assert_eq!(
        runner.batch_status(ids[0]).await.unwrap().status,
        BatchStatus::Completed
    );
}

/// Worker whose first bulk call fails wholesale, then recovers.
struct FlakyWorker {
    inner: SyncWorker<InMemoryRecordStore>,
    fail_next: AtomicBool,
}

impl Worker for FlakyWorker {
    async fn process_bulk(&self, items: &[QueueItem]) -> Result<Vec<ItemOutcome>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Internal("record store unavailable".to_string()));
        }
        self.inner.process_bulk(items).await
    }
}

#[tokio::test]
async fn test_bulk_failure_releases_group_for_retry() {
    let fixture = Fixture::new();
    let worker = Arc::new(FlakyWorker {
        inner: SyncWorker::new(fixture.records.clone()),
        fail_next: AtomicBool::new(true),
    });
    let runner = BatchRunner::new(
        fixture.queue.clone(),
        fixture.batches.clone(),
        worker,
        EngineConfig::default(),
    );

    let ids = runner.submit(sync_items(3), Utc::now(), false).await.unwrap();

    // First tick: the bulk call fails, everything goes back to the queue
    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.items_processed, 0);
    assert_eq!(report.items_released, 3);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.items_processed, 0);
    assert_eq!(
        fixture.queue.pending_len(&batch.queue_name).await.unwrap(),
        3
    );

    // Second tick: the worker recovered and the batch completes
    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.items_processed, 3);
    assert_eq!(
        runner.batch_status(ids[0]).await.unwrap().status,
        BatchStatus::Completed
    );
}

/// Worker that reports every item as transiently failed.
struct AlwaysRetryWorker;

impl Worker for AlwaysRetryWorker {
    async fn process_bulk(&self, items: &[QueueItem]) -> Result<Vec<ItemOutcome>> {
        Ok(items
            .iter()
            .map(|_| ItemOutcome::Retry("upstream busy".to_string()))
            .collect())
    }
}

#[tokio::test]
async fn test_retry_outcomes_keep_items_queued_without_progress() {
    let fixture = Fixture::new();
    let runner = BatchRunner::new(
        fixture.queue.clone(),
        fixture.batches.clone(),
        Arc::new(AlwaysRetryWorker),
        EngineConfig::default(),
    );

    let ids = runner.submit(sync_items(2), Utc::now(), false).await.unwrap();

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.items_processed, 0);
    assert_eq!(report.items_released, 2);

    let batch = runner.batch_status(ids[0]).await.unwrap();
    assert_eq!(batch.items_processed, 0);
    assert_eq!(batch.status, BatchStatus::Pending);
    assert_eq!(
        fixture.queue.pending_len(&batch.queue_name).await.unwrap(),
        2
    );
}

struct CountingHook {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl CompletionHook for CountingHook {
    async fn batch_completed(&self, batch: &Batch) -> Result<()> {
        assert_eq!(batch.status, BatchStatus::Completed);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_completion_hook_fires_at_most_once() {
    let fixture = Fixture::new();
    let hook = Arc::new(CountingHook {
        calls: AtomicUsize::new(0),
    });
    let runner = fixture
        .sync_runner(EngineConfig::default())
        .with_completion_hook(hook.clone());

    runner.submit(sync_items(3), Utc::now(), false).await.unwrap();

    runner.run_tick().await.unwrap();
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);

    // Completed batches are no longer due; extra ticks never re-fire the hook
    runner.run_tick().await.unwrap();
    runner.run_tick().await.unwrap();
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_status_unknown_batch_fails() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig::default());

    let result = runner.batch_status(crate::batch::BatchId::new()).await;
    assert!(matches!(result, Err(EngineError::BatchNotFound(_))));
}

#[tokio::test]
async fn test_max_batches_per_run_bounds_a_tick() {
    let fixture = Fixture::new();
    let runner = fixture.sync_runner(EngineConfig {
        max_batches_per_run: 2,
        min_chunk_size: 1,
        max_chunk_size: 1,
        default_delay_minutes: 0,
        ..Default::default()
    });

    // Four single-item batches, all due immediately (zero stagger)
    let ids = runner.submit(sync_items(4), Utc::now(), true).await.unwrap();
    assert_eq!(ids.len(), 4);

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.batches_touched, 2);
    assert_eq!(report.items_processed, 2);

    let report = runner.run_tick().await.unwrap();
    assert_eq!(report.batches_touched, 2);

    for id in ids {
        assert_eq!(
            runner.batch_status(id).await.unwrap().status,
            BatchStatus::Completed
        );
    }
}

//! Batch orchestration: submission, auto-chunking, and tick execution.
//!
//! The runner is constructed with every dependency it touches — queue store,
//! batch store, worker, optional completion hook, config snapshot — and is
//! driven by an external scheduler calling [`BatchRunner::run_tick`]. A tick
//! runs to completion and returns; the engine never sleeps or loops on its own.
//! Overlapping ticks are made safe at the queue-claim layer by the lease
//! compare-and-swap; batch progress additionally assumes one tick per batch
//! queue in practice, which is a documented constraint rather than a proven
//! guarantee.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::batch::progress::BatchProgressHelper;
use crate::batch::{Batch, BatchId, BatchStore};
use crate::capacity::{CapacityConfig, CapacityManager};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::queue::{QueueItem, QueueStore};
use crate::worker::{ItemOutcome, Worker};

/// Hook invoked at most once per batch, on the tick that completes it.
///
/// Typical use is materializing summary entities from the processed items.
/// Hook failures are logged and do not fail the tick; the batch is already
/// Completed by the time the hook runs.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn batch_completed(&self, batch: &Batch) -> Result<()>;
}

/// Summary of one tick's work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Due batches the tick touched
    pub batches_touched: usize,
    /// Items removed from their queues (applied or discarded)
    pub items_processed: u64,
    /// Items released back for retry
    pub items_released: u64,
    /// Batches that reached Completed during this tick
    pub batches_completed: usize,
}

/// Orchestrates batch creation and scheduled execution.
pub struct BatchRunner<Q, B, W>
where
    Q: QueueStore,
    B: BatchStore,
    W: Worker,
{
    queue: Arc<Q>,
    progress: BatchProgressHelper<B>,
    worker: Arc<W>,
    hook: Option<Arc<dyn CompletionHook>>,
    capacity: CapacityManager,
    config: EngineConfig,
}

impl<Q, B, W> BatchRunner<Q, B, W>
where
    Q: QueueStore,
    B: BatchStore,
    W: Worker,
{
    pub fn new(queue: Arc<Q>, batches: Arc<B>, worker: Arc<W>, config: EngineConfig) -> Self {
        let capacity = CapacityManager::new(CapacityConfig::from_engine(&config));
        Self {
            queue,
            progress: BatchProgressHelper::new(batches),
            worker,
            hook: None,
            capacity,
            config,
        }
    }

    /// Attach a completion hook, invoked once per batch on completion.
    pub fn with_completion_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn lease(&self) -> Duration {
        Duration::from_secs(self.config.lease_secs)
    }

    /// Submit an item set for deferred processing.
    ///
    /// With `auto_chunk`, an oversized set is split into capacity-derived
    /// chunks, one batch per chunk, each chunk's `run_at` staggered by a fixed
    /// offset to spread downstream load. A set that fits becomes a single
    /// batch; its items are still enqueued in capacity-sized sub-chunks purely
    /// to bound transient memory, without creating extra batch records.
    pub async fn submit(
        &self,
        items: Vec<Value>,
        run_at: DateTime<Utc>,
        auto_chunk: bool,
    ) -> Result<Vec<BatchId>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let check = self.capacity.check_capacity(&items);

        if auto_chunk && check.needs_chunking {
            tracing::info!(
                total_items = items.len(),
                chunk_size = check.chunk_size,
                batches_needed = check.batches_needed,
                "Submission exceeds capacity, auto-chunking"
            );

            let stagger = chrono::Duration::minutes(self.config.default_delay_minutes);
            let mut batch_ids = Vec::with_capacity(check.batches_needed);

            for (index, chunk) in items.chunks(check.chunk_size).enumerate() {
                let chunk_run_at = run_at + stagger * index as i32;
                let id = self
                    .create_one_batch(chunk.to_vec(), chunk_run_at, check.chunk_size)
                    .await?;
                batch_ids.push(id);
            }

            return Ok(batch_ids);
        }

        let id = self
            .create_one_batch(items, run_at, check.chunk_size)
            .await?;
        Ok(vec![id])
    }

    /// Create a single batch and populate its private queue in sub-chunks.
    async fn create_one_batch(
        &self,
        items: Vec<Value>,
        run_at: DateTime<Utc>,
        enqueue_chunk: usize,
    ) -> Result<BatchId> {
        let batch = self
            .progress
            .create_batch(items.len() as u64, run_at)
            .await?;

        let enqueue_chunk = enqueue_chunk.max(1);
        for sub_chunk in items.chunks(enqueue_chunk) {
            self.queue
                .enqueue_many(&batch.queue_name, batch.id, sub_chunk.to_vec())
                .await?;
        }

        Ok(batch.id)
    }

    /// Current counts and status for a batch.
    pub async fn batch_status(&self, id: BatchId) -> Result<Batch> {
        self.progress
            .store()
            .get(id)
            .await?
            .ok_or(EngineError::BatchNotFound(id))
    }

    /// Process due batches once.
    ///
    /// Finds up to `max_batches_per_run` batches with a reached `run_at`,
    /// oldest first, and works each one within the per-tick item and memory
    /// budgets. Returns without blocking when no more work is eligible;
    /// scheduling the next tick is the caller's concern.
    #[tracing::instrument(skip(self))]
    pub async fn run_tick(&self) -> Result<TickReport> {
        let now = Utc::now();
        let due = self
            .progress
            .store()
            .find_due(now, self.config.max_batches_per_run)
            .await?;

        let mut report = TickReport {
            batches_touched: due.len(),
            ..Default::default()
        };

        // Cumulative claimed-payload bytes across the whole tick
        let mut tick_bytes: u64 = 0;

        for batch in due {
            self.run_batch(&batch, &mut tick_bytes, &mut report).await?;
        }

        tracing::debug!(
            batches_touched = report.batches_touched,
            items_processed = report.items_processed,
            items_released = report.items_released,
            batches_completed = report.batches_completed,
            "Tick finished"
        );

        Ok(report)
    }

    /// Work a single due batch within the tick's budgets.
    async fn run_batch(
        &self,
        batch: &Batch,
        tick_bytes: &mut u64,
        report: &mut TickReport,
    ) -> Result<()> {
        // Greedy completion: a remainder that fits the per-tick limit is
        // processed whole, so a nearly-finished batch ends this tick instead
        // of lingering.
        let remaining = batch.remaining();
        let to_process = remaining.min(self.config.items_per_run as u64);

        tracing::debug!(
            batch_id = %batch.id,
            remaining,
            to_process,
            "Processing batch"
        );

        let mut claimed_total: u64 = 0;
        while claimed_total < to_process {
            if *tick_bytes > self.config.memory_threshold_bytes() {
                tracing::warn!(
                    batch_id = %batch.id,
                    tick_bytes,
                    threshold_mb = self.config.memory_threshold_mb,
                    "Memory ceiling reached, deferring remaining items to the next tick"
                );
                break;
            }

            // Claim one item at a time into a bulk group
            let want = (to_process - claimed_total).min(self.config.bulk_process_size as u64);
            let mut group: Vec<QueueItem> = Vec::with_capacity(want as usize);
            for _ in 0..want {
                match self.queue.claim(&batch.queue_name, self.lease()).await? {
                    Some(item) => {
                        *tick_bytes += item.payload_bytes();
                        group.push(item);
                    }
                    None => break,
                }
            }

            if group.is_empty() {
                // Queue drained or every remaining item is interval-gated/leased
                break;
            }
            claimed_total += group.len() as u64;

            let advanced = self.process_group(batch, &group, report).await?;
            if !advanced {
                // Bulk call failed; the group went back to the queue. Leave
                // this batch for a later tick rather than hammering it.
                break;
            }
        }

        Ok(())
    }

    /// Hand one claimed group to the worker and settle every item.
    ///
    /// Returns false when the bulk call itself failed and the group was
    /// released.
    async fn process_group(
        &self,
        batch: &Batch,
        group: &[QueueItem],
        report: &mut TickReport,
    ) -> Result<bool> {
        let outcomes = match self.worker.process_bulk(group).await {
            Ok(outcomes) if outcomes.len() == group.len() => outcomes,
            Ok(outcomes) => {
                tracing::error!(
                    batch_id = %batch.id,
                    expected = group.len(),
                    got = outcomes.len(),
                    "Worker returned wrong outcome count, releasing group"
                );
                self.release_group(group, report).await;
                return Ok(false);
            }
            Err(e) => {
                tracing::error!(
                    batch_id = %batch.id,
                    group_len = group.len(),
                    error = %e,
                    "Bulk processing failed, releasing group for retry"
                );
                self.release_group(group, report).await;
                return Ok(false);
            }
        };

        let mut advanced: u64 = 0;
        for (item, outcome) in group.iter().zip(outcomes) {
            match outcome {
                ItemOutcome::Applied => {
                    self.queue.delete(item.id).await?;
                    advanced += 1;
                }
                ItemOutcome::Retry(reason) => {
                    tracing::warn!(
                        batch_id = %batch.id,
                        item_id = %item.id,
                        reason,
                        "Item failed transiently, releasing for retry"
                    );
                    self.queue.release(item.id).await?;
                    report.items_released += 1;
                }
                ItemOutcome::Discard(reason) => {
                    tracing::warn!(
                        batch_id = %batch.id,
                        item_id = %item.id,
                        reason,
                        "Item discarded"
                    );
                    self.queue.delete(item.id).await?;
                    advanced += 1;
                }
                ItemOutcome::NeedsDisambiguation(candidates) => {
                    tracing::warn!(
                        batch_id = %batch.id,
                        item_id = %item.id,
                        candidates = ?candidates,
                        "Item needs disambiguation, dropping without applying"
                    );
                    self.queue.delete(item.id).await?;
                    advanced += 1;
                }
            }
        }

        if advanced > 0 {
            report.items_processed += advanced;
            let progress = self.progress.advance(batch.id, advanced).await?;

            if progress.just_completed {
                report.batches_completed += 1;
                self.fire_completion_hook(batch.id).await;
            }
        }

        Ok(true)
    }

    async fn release_group(&self, group: &[QueueItem], report: &mut TickReport) {
        for item in group {
            if let Err(e) = self.queue.release(item.id).await {
                tracing::error!(item_id = %item.id, error = %e, "Failed to release item");
            } else {
                report.items_released += 1;
            }
        }
    }

    /// Run the completion hook, guarded by the Completed transition itself so
    /// it fires at most once per batch.
    async fn fire_completion_hook(&self, id: BatchId) {
        let Some(hook) = &self.hook else {
            return;
        };

        match self.progress.store().get(id).await {
            Ok(Some(batch)) => {
                if let Err(e) = hook.batch_completed(&batch).await {
                    tracing::error!(batch_id = %id, error = %e, "Completion hook failed");
                }
            }
            Ok(None) => {
                tracing::error!(batch_id = %id, "Completed batch vanished before its hook ran");
            }
            Err(e) => {
                tracing::error!(batch_id = %id, error = %e, "Failed to load batch for its hook");
            }
        }
    }
}

#[cfg(test)]
mod tests;

//! Read-only configuration snapshot for the engine.
//!
//! Loading (files, environment, flags) is the caller's concern; the engine only
//! consumes a constructed snapshot. All components receive the values they need
//! explicitly at construction time.

/// Tuning knobs for the batch engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of items to process per batch in a single tick
    pub items_per_run: usize,

    /// Maximum number of due batches to touch in a single tick
    pub max_batches_per_run: usize,

    /// Number of claimed items handed to the worker in one bulk call
    pub bulk_process_size: usize,

    /// Ceiling on cumulative claimed-payload bytes within one tick, in MiB.
    /// Once exceeded, the current batch stops claiming and the tick moves on.
    pub memory_threshold_mb: u64,

    /// Memory budget used by capacity estimation when sizing chunks, in MiB
    pub max_memory_usage_mb: u64,

    /// Lower bound for capacity-derived chunk sizes
    pub min_chunk_size: usize,

    /// Upper bound for capacity-derived chunk sizes
    pub max_chunk_size: usize,

    /// Stagger between the `run_at` of consecutive auto-chunked batches, in minutes
    pub default_delay_minutes: i64,

    /// Minimum age an enqueued item must reach before it becomes claimable, in seconds
    pub claim_interval_secs: u64,

    /// Lease duration granted by a successful claim, in seconds
    pub lease_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            items_per_run: 200,
            max_batches_per_run: 5,
            bulk_process_size: 50,
            memory_threshold_mb: 64,
            max_memory_usage_mb: 256,
            min_chunk_size: 10,
            max_chunk_size: 1000,
            default_delay_minutes: 1,
            claim_interval_secs: 0,
            lease_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Memory ceiling for a tick, in bytes.
    pub fn memory_threshold_bytes(&self) -> u64 {
        self.memory_threshold_mb * 1024 * 1024
    }
}

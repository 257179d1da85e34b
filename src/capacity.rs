//! Capacity estimation for oversized submissions.
//!
//! Samples a submission's items, estimates the memory footprint of the full set,
//! and derives a chunk size that keeps a batch within the configured memory
//! budget. Everything here is pure; the runner composes these estimates into its
//! auto-chunking decision.

use serde_json::Value;

use crate::config::EngineConfig;

/// Number of items sampled by default when estimating memory.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Chunk-sizing configuration, derived from the engine config.
#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// Memory budget for a single batch, in MiB
    pub max_memory_mb: u64,
    /// Smallest chunk size ever recommended
    pub min_chunk: usize,
    /// Largest chunk size ever recommended
    pub max_chunk: usize,
    /// Fraction of the memory budget actually spent (headroom for overhead)
    pub safety_factor: f64,
}

impl CapacityConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            max_memory_mb: config.max_memory_usage_mb,
            min_chunk: config.min_chunk_size,
            max_chunk: config.max_chunk_size,
            safety_factor: 0.7,
        }
    }
}

/// Sampled memory footprint of an item set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEstimate {
    pub bytes_per_item: u64,
    pub total_bytes: u64,
}

/// Recommended division of an item set into memory-safe chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: usize,
    pub batches_needed: usize,
}

/// Result of a capacity check for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityCheck {
    pub needs_chunking: bool,
    pub chunk_size: usize,
    pub batches_needed: usize,
}

/// Estimates memory needs and recommends chunk sizes for submissions.
#[derive(Debug, Clone)]
pub struct CapacityManager {
    config: CapacityConfig,
}

impl CapacityManager {
    pub fn new(config: CapacityConfig) -> Self {
        Self { config }
    }

    /// Memory budget a single chunk may occupy, in bytes, after the safety factor.
    pub fn safe_memory_budget_bytes(&self) -> u64 {
        let budget = self.config.max_memory_mb as f64 * 1024.0 * 1024.0 * self.config.safety_factor;
        budget as u64
    }

    /// Estimate the memory footprint of `items` from a sample of up to `sample_size`.
    ///
    /// Serializes the sampled items, averages their encoded size, and extrapolates
    /// to the full set. Approximate by design; deterministic for the same sample.
    pub fn estimate_memory(items: &[Value], sample_size: usize) -> MemoryEstimate {
        let sample = items.iter().take(sample_size.max(1));
        let mut sampled = 0u64;
        let mut sampled_bytes = 0u64;
        for item in sample {
            sampled += 1;
            sampled_bytes += serde_json::to_vec(item).map(|b| b.len() as u64).unwrap_or(0);
        }

        let bytes_per_item = if sampled == 0 { 0 } else { sampled_bytes / sampled };
        MemoryEstimate {
            bytes_per_item,
            total_bytes: bytes_per_item * items.len() as u64,
        }
    }

    /// Compute a chunk size that keeps one chunk within the memory budget.
    ///
    /// Never returns a zero chunk size: an unknown per-item footprint falls back
    /// to the configured minimum, and misconfigured bounds are sanitized to at
    /// least one item per chunk.
    pub fn safe_chunk_size(&self, total_items: usize, bytes_per_item: u64) -> ChunkPlan {
        let min_chunk = self.config.min_chunk.max(1);
        let max_chunk = self.config.max_chunk.max(min_chunk);

        let chunk_size = if bytes_per_item == 0 {
            min_chunk
        } else {
            let fitting = (self.safe_memory_budget_bytes() / bytes_per_item) as usize;
            fitting.clamp(min_chunk, max_chunk)
        };

        let batches_needed = if total_items == 0 {
            0
        } else {
            total_items.div_ceil(chunk_size)
        };

        ChunkPlan {
            chunk_size,
            batches_needed,
        }
    }

    /// Decide whether `items` must be split across multiple batches.
    pub fn check_capacity(&self, items: &[Value]) -> CapacityCheck {
        let estimate = Self::estimate_memory(items, DEFAULT_SAMPLE_SIZE);
        let plan = self.safe_chunk_size(items.len(), estimate.bytes_per_item);
        CapacityCheck {
            needs_chunking: plan.batches_needed > 1,
            chunk_size: plan.chunk_size,
            batches_needed: plan.batches_needed,
        }
    }
}

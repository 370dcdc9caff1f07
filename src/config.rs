//! Tunables for index building, chunk caching, and parallel filtering.

/// Physical lines per chunk when building or filtering.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000;

/// Number of decoded chunks kept resident in the LRU cache.
pub const DEFAULT_CACHE_CHUNKS: usize = 50;

/// Block size used by [`crate::store::VirtualStore::tail`] backward reads.
pub const DEFAULT_TAIL_BLOCK_SIZE: usize = 8 * 1024;

/// How often, in physical lines, index building and filtering report
/// progress and check for cancellation.
pub const DEFAULT_PROGRESS_INTERVAL_LINES: u64 = 10_000;

/// Runtime configuration for a [`crate::store::VirtualStore`].
///
/// `Default::default()` picks a `worker_count` from the host's available
/// parallelism using the same tiered heuristic as the system this store's
/// behavior was modeled on: generous hosts give up two cores to the rest
/// of the system, modest hosts give up only one, and anything smaller
/// just uses what it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Physical lines per index/filter chunk.
    pub chunk_size: u64,
    /// Decoded chunks kept resident in the LRU cache.
    pub cache_chunks: usize,
    /// Worker threads used by the filter engine's `rayon` pool.
    pub worker_count: usize,
    /// Block size for backward tail reads.
    pub tail_block_size: usize,
    /// Physical-line interval between progress callback invocations.
    pub progress_interval_lines: u64,
}

impl StoreConfig {
    /// Applies the tiered worker-count heuristic to an arbitrary core
    /// count, independent of the host's actual parallelism. Exposed so
    /// callers (and tests) can reason about the heuristic without
    /// depending on the machine they happen to run on.
    pub fn worker_count_for_cores(cores: usize) -> usize {
        match cores {
            0 => 1,
            c if c >= 16 => c - 2,
            c if c >= 8 => c - 1,
            c => c,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        StoreConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_chunks: DEFAULT_CACHE_CHUNKS,
            worker_count: Self::worker_count_for_cores(cores),
            tail_block_size: DEFAULT_TAIL_BLOCK_SIZE,
            progress_interval_lines: DEFAULT_PROGRESS_INTERVAL_LINES,
        }
    }
}

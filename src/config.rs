//! Runtime configuration threaded through the registry, indexers and cache.
//!
//! Replaces the original implementation's static `gMinDictBlockFactor` and a
//! file-scope `CacheSize` constant (see `GzipFile.h`, `main.cpp`) with a single
//! value built once from CLI flags and passed explicitly.

/// Default cache bound: 32 MiB of decoded bytes, matching the original's
/// `CacheSize` constant in `main.cpp`.
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 32 * 1024 * 1024;

/// Default minimum dictionary-bearing block span, as a multiple of 32 KiB.
pub const DEFAULT_GZIP_BLOCK_FACTOR: u64 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum uncompressed span (in multiples of 32 KiB) a gzip block must
    /// cover before it is allowed to carry its own dictionary snapshot;
    /// shorter blocks are merged into their predecessor.
    pub gzip_block_factor: u64,
    /// Optional cap on any single block's uncompressed size. Archives whose
    /// indexer discovers a larger block are rejected outright.
    pub max_block_size: Option<u64>,
    /// Upper bound on total bytes held by `Ready` cache entries.
    pub cache_size_bytes: u64,
    /// Worker count for the decompression thread pool; `None` defers to
    /// `num_cpus::get()`.
    pub worker_threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gzip_block_factor: DEFAULT_GZIP_BLOCK_FACTOR,
            max_block_size: None,
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
            worker_threads: None,
        }
    }
}

impl Config {
    pub fn gzip_min_dict_span(&self) -> u64 {
        self.gzip_block_factor * 32 * 1024
    }
}

//! Estimate how well a set of files deduplicates in a content-defined
//! chunking store.
//!
//! Each input is split into content-defined chunks (gear rolling hash,
//! chunk sizes bounded around a configurable power-of-two target), chunks
//! are deduplicated by XXH3-64 fingerprint, and distinct chunks get a fast
//! LZ4-based compressed-size estimate. The result reports how many bytes
//! went in, how many distinct chunk bytes remain, and how small those would
//! be after compression.
//!
//! ```no_run
//! fn main() -> dedupe_estimator::Result<()> {
//!     let result = dedupe_estimator::estimate(&["a.parquet", "b.parquet"])?;
//!     println!(
//!         "{} of {} bytes unique ({:.0}%)",
//!         result.chunk_bytes,
//!         result.total_len,
//!         100.0 * result.dedup_ratio()
//!     );
//!     Ok(())
//! }
//! ```

use std::path::Path;

mod chunker;
mod dedupe_map;
mod error;
mod store;

pub use chunker::{Chunker, DEFAULT_TARGET_CHUNK_SIZE};
pub use dedupe_map::write_dedupe_map;
pub use error::{EstimateError, Result};
pub use store::{ChunkRecord, ChunkStore, DedupeResult};

/// Knobs for [`estimate_with`].
#[derive(Debug, Clone)]
pub struct EstimateOptions {
    /// Target chunk size; must be a power of two above the 64 byte hash
    /// window. Chunks land in `[target / 8, target * 2]`.
    pub target_chunk_size: usize,
    /// Retain raw chunk bytes in the stores, for callers that want to
    /// inspect chunk contents via [`ChunkStore::data_chunks`].
    pub keep_chunk_data: bool,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        EstimateOptions {
            target_chunk_size: DEFAULT_TARGET_CHUNK_SIZE,
            keep_chunk_data: false,
        }
    }
}

/// Everything produced by one estimator run: the per-source stores in path
/// order, the merged store, and the aggregate result.
#[derive(Debug)]
pub struct Estimate {
    pub result: DedupeResult,
    pub stores: Vec<ChunkStore>,
    pub merged: ChunkStore,
}

impl Estimate {
    /// First-seen provenance of each source's chunk sequence, suitable for
    /// [`write_dedupe_map`]. The merged store's own sequence is
    /// `self.merged.segments()`.
    pub fn source_segments(&self) -> Vec<Vec<usize>> {
        self.stores
            .iter()
            .map(|store| store.segments_in(&self.merged))
            .collect()
    }
}

/// Estimates deduplication across `paths` with default options.
///
/// Files are chunked in parallel and aggregated into one result. Fails on
/// the first unreadable path.
pub fn estimate<P: AsRef<Path> + Send + Sync>(paths: &[P]) -> Result<DedupeResult> {
    Ok(estimate_with(paths, &EstimateOptions::default())?.result)
}

/// Like [`estimate`], but configurable, and returns the underlying chunk
/// stores along with the aggregate result.
pub fn estimate_with<P: AsRef<Path> + Send + Sync>(
    paths: &[P],
    options: &EstimateOptions,
) -> Result<Estimate> {
    let stores = ChunkStore::from_files(paths, options.target_chunk_size, options.keep_chunk_data)?;
    let merged = ChunkStore::merge(&stores);
    let result = merged.stats();
    Ok(Estimate {
        result,
        stores,
        merged,
    })
}

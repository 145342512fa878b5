//! Chunk fingerprint index and deduplication accounting.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indicatif::{ParallelProgressIterator, ProgressIterator};
use log::debug;
use lz4_flex::block;
use rayon::prelude::*;
use xxhash_rust::xxh3::xxh3_64;

use crate::chunker::Chunker;
use crate::error::{EstimateError, Result};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Aggregate statistics for one `estimate` call.
///
/// `total_len` counts every input byte, `chunk_bytes` only the bytes of
/// distinct chunks, and `compressed_chunk_bytes` the estimated size of those
/// distinct chunks after compression. For any input,
/// `compressed_chunk_bytes <= chunk_bytes <= total_len`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupeResult {
    pub total_len: usize,
    pub chunk_bytes: usize,
    pub compressed_chunk_bytes: usize,
}

impl DedupeResult {
    /// Fraction of the input that survives deduplication, in `[0, 1]`.
    pub fn dedup_ratio(&self) -> f64 {
        ratio(self.chunk_bytes, self.total_len)
    }

    /// Fraction of the input that survives deduplication and compression.
    pub fn compressed_dedup_ratio(&self) -> f64 {
        ratio(self.compressed_chunk_bytes, self.total_len)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// One distinct chunk in the fingerprint index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Raw chunk length in bytes.
    pub len: usize,
    /// LZ4 block compressed length, clamped at `len`; an incompressible
    /// chunk is counted at its raw size.
    pub compressed_len: usize,
    /// Index of the source that first produced this chunk. Assigned by
    /// [`ChunkStore::merge`]; zero in a single-source store.
    pub first_seen_in: usize,
    /// Indices of all sources containing this chunk. Filled by `merge`.
    pub seen_in: Vec<usize>,
    data: Option<Vec<u8>>,
}

/// Fingerprint index over the chunks of one source, or of several sources
/// once merged.
///
/// Duplicate chunks count toward `total_len` but occupy a single index
/// entry, which is what turns chunk accounting into a deduplication
/// estimate.
#[derive(Debug, Default)]
pub struct ChunkStore {
    total: usize,
    order: Vec<u64>,
    chunks: HashMap<u64, ChunkRecord>,
    target_chunk_size: usize,
    keep_data: bool,
}

impl ChunkStore {
    pub fn new(target_chunk_size: usize, keep_data: bool) -> Self {
        ChunkStore {
            total: 0,
            order: Vec::new(),
            chunks: HashMap::new(),
            target_chunk_size,
            keep_data,
        }
    }

    /// Records one chunk: XXH3-64 fingerprint, dedup accounting, and the
    /// compressed-size estimate for first sightings.
    pub fn add(&mut self, chunk: &[u8]) {
        let fingerprint = xxh3_64(chunk);
        self.total += chunk.len();
        self.order.push(fingerprint);

        let keep_data = self.keep_data;
        self.chunks.entry(fingerprint).or_insert_with(|| ChunkRecord {
            len: chunk.len(),
            compressed_len: block::compress(chunk).len().min(chunk.len()),
            first_seen_in: 0,
            seen_in: Vec::new(),
            data: keep_data.then(|| chunk.to_vec()),
        });
    }

    /// Chunks an entire byte stream into a fresh store.
    pub fn from_reader<R: Read>(
        mut reader: R,
        target_chunk_size: usize,
        keep_data: bool,
    ) -> Result<Self> {
        let mut store = ChunkStore::new(target_chunk_size, keep_data);
        let mut chunker = Chunker::new(target_chunk_size)?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            for chunk in chunker.next_block(&buffer[..n], false) {
                store.add(&chunk);
            }
        }
        if let Some(chunk) = chunker.finish() {
            store.add(&chunk);
        }

        Ok(store)
    }

    pub fn from_file<P: AsRef<Path>>(
        path: P,
        target_chunk_size: usize,
        keep_data: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let attach_path = |err| match err {
            EstimateError::Stream(source) => EstimateError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        };

        let file = File::open(path).map_err(|source| EstimateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_reader(BufReader::new(file), target_chunk_size, keep_data)
            .map_err(attach_path)?;

        debug!(
            "{}: {} bytes in {} chunks ({} unique)",
            path.display(),
            store.total,
            store.chunk_count(),
            store.unique_chunk_count()
        );
        Ok(store)
    }

    /// Builds one store per path, in parallel. Fails on the first unreadable
    /// path; the bare aggregate result has no channel for partial failures.
    pub fn from_files<P: AsRef<Path> + Send + Sync>(
        paths: &[P],
        target_chunk_size: usize,
        keep_data: bool,
    ) -> Result<Vec<Self>> {
        paths
            .par_iter()
            .progress_count(paths.len() as u64)
            .map(|path| Self::from_file(path, target_chunk_size, keep_data))
            .collect()
    }

    /// Chunks in-memory buffers, one store per buffer.
    pub fn from_bytes<B: AsRef<[u8]>>(
        buffers: &[B],
        target_chunk_size: usize,
        keep_data: bool,
    ) -> Result<Vec<Self>> {
        buffers
            .iter()
            .progress_count(buffers.len() as u64)
            .map(|buf| Self::from_reader(buf.as_ref(), target_chunk_size, keep_data))
            .collect()
    }

    /// Folds per-source stores into one, assigning first-seen provenance in
    /// source order. Duplicate fingerprints across sources collapse into a
    /// single record, so the merged stats are the deduplicated totals.
    pub fn merge(stores: &[ChunkStore]) -> Self {
        let target = stores
            .first()
            .map(|s| s.target_chunk_size)
            .unwrap_or(crate::chunker::DEFAULT_TARGET_CHUNK_SIZE);
        let keep_data = stores.iter().any(|s| s.keep_data);
        let mut merged = ChunkStore::new(target, keep_data);

        for (index, store) in stores.iter().enumerate() {
            merged.total += store.total;
            merged.order.extend_from_slice(&store.order);
            for (fingerprint, record) in &store.chunks {
                let entry = merged
                    .chunks
                    .entry(*fingerprint)
                    .or_insert_with(|| ChunkRecord {
                        len: record.len,
                        compressed_len: record.compressed_len,
                        first_seen_in: index,
                        seen_in: Vec::new(),
                        data: record.data.clone(),
                    });
                entry.seen_in.push(index);
            }
        }

        debug!(
            "merged {} sources: {} bytes, {} unique chunks",
            stores.len(),
            merged.total,
            merged.unique_chunk_count()
        );
        merged
    }

    /// Aggregate statistics over the distinct chunks of this store.
    pub fn stats(&self) -> DedupeResult {
        DedupeResult {
            total_len: self.total,
            chunk_bytes: self.chunks.values().map(|c| c.len).sum(),
            compressed_chunk_bytes: self.chunks.values().map(|c| c.compressed_len).sum(),
        }
    }

    /// Total bytes fed into this store, duplicates included.
    pub fn total_len(&self) -> usize {
        self.total
    }

    /// Number of chunk boundaries produced, duplicates included.
    pub fn chunk_count(&self) -> usize {
        self.order.len()
    }

    /// Number of distinct fingerprints.
    pub fn unique_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Fingerprints and records in boundary order. Duplicate chunks repeat
    /// their fingerprint.
    pub fn records(&self) -> impl Iterator<Item = (u64, &ChunkRecord)> + '_ {
        self.order.iter().map(move |fp| (*fp, &self.chunks[fp]))
    }

    /// First-seen source index for each chunk in boundary order, resolved
    /// against this store's own provenance.
    pub fn segments(&self) -> Vec<usize> {
        self.segments_in(self)
    }

    /// First-seen source index for each chunk in boundary order, resolved
    /// against `reference` (typically the merged store).
    pub fn segments_in(&self, reference: &ChunkStore) -> Vec<usize> {
        self.order
            .iter()
            .map(|fp| reference.chunks.get(fp).map_or(0, |r| r.first_seen_in))
            .collect()
    }

    /// Raw bytes of every distinct chunk, keyed by fingerprint. `None`
    /// unless the store was built with chunk data retention.
    pub fn data_chunks(&self) -> Option<HashMap<u64, Vec<u8>>> {
        if !self.keep_data {
            return None;
        }
        Some(
            self.chunks
                .iter()
                .map(|(fp, record)| (*fp, record.data.clone().unwrap_or_default()))
                .collect(),
        )
    }
}

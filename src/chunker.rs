//! Streaming content-defined chunker.
//!
//! Boundaries are declared where a gear rolling hash over the last 64 bytes
//! matches a mask derived from the target chunk size, keeping chunk lengths
//! within `[target / 8, target * 2]`. Content-defined boundaries survive
//! insertions and deletions in the input, which is what makes chunk-level
//! deduplication estimates meaningful at all.

use crate::error::{EstimateError, Result};

/// Default target chunk size, giving chunks in `[8 KiB, 128 KiB]`.
pub const DEFAULT_TARGET_CHUNK_SIZE: usize = 64 * 1024;

/// Window size of the gear hash. Boundaries cannot be declared before one
/// full window of input has been hashed.
const HASH_WINDOW_SIZE: usize = 64;

const MIN_CHUNK_DIVISOR: usize = 8;
const MAX_CHUNK_MULTIPLIER: usize = 2;

/// Incremental chunk generator over a single byte stream.
///
/// Feed data with [`next`](Chunker::next) or [`next_block`](Chunker::next_block)
/// and close the stream with [`finish`](Chunker::finish). Each input stream
/// needs its own `Chunker`; boundary decisions never leak across streams.
pub struct Chunker {
    hasher: gearhash::Hasher<'static>,
    mask: u64,
    min_size: usize,
    max_size: usize,
    buf: Vec<u8>,
}

impl Chunker {
    /// Creates a chunker for the given target chunk size.
    ///
    /// The target must be a power of two, larger than the 64 byte hash
    /// window and below 2^31.
    pub fn new(target_size: usize) -> Result<Self> {
        if !target_size.is_power_of_two()
            || target_size <= HASH_WINDOW_SIZE
            || target_size >= (1 << 31)
        {
            return Err(EstimateError::InvalidChunkSize(target_size));
        }

        // The low bits of a gear hash react to very few input bytes, so the
        // mask is shifted all the way into the high bits.
        let mask = (target_size - 1) as u64;
        let mask = mask << mask.leading_zeros();

        let max_size = target_size * MAX_CHUNK_MULTIPLIER;

        Ok(Chunker {
            hasher: gearhash::Hasher::default(),
            mask,
            min_size: target_size / MIN_CHUNK_DIVISOR,
            max_size,
            buf: Vec::with_capacity(max_size),
        })
    }

    /// Smallest chunk length a content boundary may produce.
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Length at which a boundary is forced.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Consumes bytes from `data`, returning the next completed chunk (if
    /// any) and how many bytes were consumed. Callers keep invoking this
    /// with the unconsumed remainder. With `is_final` set, leftover buffered
    /// bytes are flushed as a last, possibly short, chunk.
    pub fn next(&mut self, data: &[u8], is_final: bool) -> (Option<Vec<u8>>, usize) {
        let mut consumed = 0;
        let mut emit = false;

        if !data.is_empty() {
            // Bytes that end more than one hash window before min_size can
            // never precede an accepted boundary, so they are not hashed.
            if self.buf.len() + HASH_WINDOW_SIZE < self.min_size {
                let skip = self.min_size - self.buf.len() - HASH_WINDOW_SIZE - 1;
                consumed = skip.min(data.len());
            }

            // Never scan past the point where max_size forces a boundary.
            let remaining = self.max_size - self.buf.len() - consumed;
            let scan_end = data.len().min(consumed + remaining);

            loop {
                match self.hasher.next_match(&data[consumed..scan_end], self.mask) {
                    Some(len) => {
                        consumed += len;
                        // Matches inside the warmup stretch just before
                        // min_size are skipped over.
                        if self.buf.len() + consumed >= self.min_size {
                            emit = true;
                            break;
                        }
                    }
                    None => {
                        consumed = scan_end;
                        break;
                    }
                }
            }

            if self.buf.len() + consumed >= self.max_size {
                consumed = self.max_size - self.buf.len();
                emit = true;
            }
            self.buf.extend_from_slice(&data[..consumed]);
        }

        if emit || (is_final && !self.buf.is_empty()) {
            self.hasher.set_hash(0);
            (Some(std::mem::take(&mut self.buf)), consumed)
        } else {
            (None, consumed)
        }
    }

    /// Runs `next` over a whole block, collecting every completed chunk.
    ///
    /// With `is_final` set the buffered tail is flushed too, except when
    /// `data` is empty; use [`finish`](Chunker::finish) to close a stream
    /// that may have ended on a block boundary.
    pub fn next_block(&mut self, data: &[u8], is_final: bool) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let (chunk, consumed) = self.next(&data[pos..], is_final);
            if let Some(chunk) = chunk {
                chunks.push(chunk);
            }
            pos += consumed;
        }
        chunks
    }

    /// Flushes any buffered bytes as the final chunk. An empty stream
    /// produces no chunk at all.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        self.next(&[], true).0
    }
}

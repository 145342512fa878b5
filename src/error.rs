use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = EstimateError> = std::result::Result<T, E>;

/// Errors produced while estimating deduplication.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// An input path could not be opened or read.
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An anonymous input stream failed mid-read.
    #[error("failed to read input stream")]
    Stream(#[from] io::Error),

    /// The target chunk size must be a power of two in (64, 2^31).
    #[error("invalid target chunk size {0}")]
    InvalidChunkSize(usize),

    /// A dedupe map image could not be written.
    #[error("failed to write dedupe map {}", path.display())]
    MapRender {
        path: PathBuf,
        #[source]
        source: png::EncodingError,
    },
}

//! Error types for dlp-sources

use dlp_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open {filename}: {source}")]
    Open {
        filename: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to read {filename} after {chunks_emitted} chunks: {source}")]
    Read {
        filename: String,
        chunks_emitted: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Listing failed: {0}")]
    Listing(#[from] StorageError),

    #[error("Chunk consumer closed while reading {0}")]
    ChannelClosed(String),

    #[error("Reader task failed: {0}")]
    Task(String),
}

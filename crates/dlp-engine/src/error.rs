//! Error types for dlp-engine

use dlp_sources::SourceError;
use dlp_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that halt the whole run
///
/// Per-file and per-chunk failures never surface here; they are reported as
/// events and the run continues.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Discovery halted: {0}")]
    Discovery(#[from] SourceError),

    #[error("Failed to write shard {path} after {attempts} attempts: {source}")]
    Write {
        path: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("Cannot derive shard name: {0}")]
    ShardName(#[from] dlp_core::Error),

    #[error("Pipeline task failed: {0}")]
    Task(String),
}

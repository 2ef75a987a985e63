//! Core domain models and logic for dlp-stream
//!
//! This crate contains:
//! - Records passed between pipeline stages (FileHandle, Chunk, RedactedChunk, WindowedGroup)
//! - Output shard naming
//! - Retry policy shared by the remote-call stages
//! - Observability events and sinks

pub mod error;
pub mod events;
pub mod model;
pub mod retry;

pub use error::{Error, Result};
pub use events::{EventSink, MemoryEventSink, PipelineEvent, SharedEventSink, TracingEventSink};
pub use model::{
    Chunk, Compression, FileHandle, GroupOrdering, OutputShard, RedactedChunk, ShardNaming,
    Window, WindowedGroup,
};
pub use retry::{RetryConfig, RetryOutcome, Retryable};

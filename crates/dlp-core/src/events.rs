//! Observability events emitted by pipeline stages
//!
//! Stages never log directly; they hand a [`PipelineEvent`] to the
//! [`EventSink`] they were constructed with. The binary installs
//! [`TracingEventSink`], tests install [`MemoryEventSink`].

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::model::Window;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    FileDiscovered {
        filename: String,
        resource_id: String,
    },
    ListingFailed {
        pattern: String,
        reason: String,
    },
    StreamOpenFailed {
        filename: String,
        reason: String,
    },
    FileReadFailed {
        filename: String,
        chunks_emitted: usize,
        reason: String,
    },
    FileCompleted {
        filename: String,
        chunks: usize,
    },
    ChunkRedacted {
        filename: String,
        sequence: u64,
        request_bytes: usize,
        attempts: u32,
    },
    RedactionFailed {
        filename: String,
        sequence: u64,
        attempts: u32,
        reason: String,
    },
    LateChunkDropped {
        filename: String,
        sequence: u64,
        window: Window,
    },
    ChunkDiscarded {
        filename: String,
        sequence: u64,
        window: Window,
    },
    WindowFired {
        filename: String,
        window: Window,
        chunks: usize,
    },
    ShardWritten {
        filename: String,
        path: String,
        bytes: usize,
        attempts: u32,
    },
    ShardWriteFailed {
        filename: String,
        path: String,
        attempts: u32,
        reason: String,
    },
}

/// Capability for recording pipeline events
pub trait EventSink: Send + Sync {
    fn record(&self, event: PipelineEvent);
}

pub type SharedEventSink = Arc<dyn EventSink>;

/// Renders every event as a `tracing` log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::FileDiscovered {
                filename,
                resource_id,
            } => info!(%filename, %resource_id, "Discovered input file"),
            PipelineEvent::ListingFailed { pattern, reason } => {
                warn!(%pattern, %reason, "Listing failed, retrying on next poll")
            }
            PipelineEvent::StreamOpenFailed { filename, reason } => {
                error!(%filename, %reason, "Failed to open input file")
            }
            PipelineEvent::FileReadFailed {
                filename,
                chunks_emitted,
                reason,
            } => error!(%filename, chunks_emitted, %reason, "Read failed mid-stream"),
            PipelineEvent::FileCompleted { filename, chunks } => {
                debug!(%filename, chunks, "Finished reading file")
            }
            PipelineEvent::ChunkRedacted {
                filename,
                sequence,
                request_bytes,
                attempts,
            } => info!(
                %filename,
                sequence,
                attempts,
                "Redacted chunk, request size {} bytes",
                request_bytes
            ),
            PipelineEvent::RedactionFailed {
                filename,
                sequence,
                attempts,
                reason,
            } => error!(%filename, sequence, attempts, %reason, "Redaction failed, chunk dropped"),
            PipelineEvent::LateChunkDropped {
                filename,
                sequence,
                window,
            } => warn!(%filename, sequence, %window, "Dropped chunk for closed window"),
            PipelineEvent::ChunkDiscarded {
                filename,
                sequence,
                window,
            } => warn!(%filename, sequence, %window, "Dropped chunk for already fired pane"),
            PipelineEvent::WindowFired {
                filename,
                window,
                chunks,
            } => debug!(%filename, %window, chunks, "Window fired"),
            PipelineEvent::ShardWritten {
                filename,
                path,
                bytes,
                attempts,
            } => info!(%filename, %path, bytes, attempts, "Wrote output shard"),
            PipelineEvent::ShardWriteFailed {
                filename,
                path,
                attempts,
                reason,
            } => error!(%filename, %path, attempts, %reason, "Output shard write failed"),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

//! Run counters derived from pipeline events

use std::fmt;
use std::sync::Mutex;

use dlp_core::{EventSink, PipelineEvent, SharedEventSink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub files_discovered: usize,
    pub files_failed: usize,
    pub listing_failures: usize,
    pub chunks_read: usize,
    pub chunks_redacted: usize,
    pub redaction_failures: usize,
    pub chunks_late: usize,
    pub chunks_discarded: usize,
    pub groups_fired: usize,
    pub shards_written: usize,
    pub shard_write_failures: usize,
}

impl PipelineReport {
    fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::FileDiscovered { .. } => self.files_discovered += 1,
            PipelineEvent::ListingFailed { .. } => self.listing_failures += 1,
            PipelineEvent::StreamOpenFailed { .. } => self.files_failed += 1,
            PipelineEvent::FileReadFailed { chunks_emitted, .. } => {
                self.files_failed += 1;
                self.chunks_read += chunks_emitted;
            }
            PipelineEvent::FileCompleted { chunks, .. } => self.chunks_read += chunks,
            PipelineEvent::ChunkRedacted { .. } => self.chunks_redacted += 1,
            PipelineEvent::RedactionFailed { .. } => self.redaction_failures += 1,
            PipelineEvent::LateChunkDropped { .. } => self.chunks_late += 1,
            PipelineEvent::ChunkDiscarded { .. } => self.chunks_discarded += 1,
            PipelineEvent::WindowFired { .. } => self.groups_fired += 1,
            PipelineEvent::ShardWritten { .. } => self.shards_written += 1,
            PipelineEvent::ShardWriteFailed { .. } => self.shard_write_failures += 1,
        }
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files: {} discovered, {} failed; chunks: {} read, {} redacted, {} failed, {} late, {} discarded; shards: {} fired, {} written",
            self.files_discovered,
            self.files_failed,
            self.chunks_read,
            self.chunks_redacted,
            self.redaction_failures,
            self.chunks_late,
            self.chunks_discarded,
            self.groups_fired,
            self.shards_written,
        )
    }
}

/// Forwards events to an inner sink while tallying a [`PipelineReport`]
pub struct ReportingEventSink {
    inner: SharedEventSink,
    report: Mutex<PipelineReport>,
}

impl ReportingEventSink {
    pub fn new(inner: SharedEventSink) -> Self {
        Self {
            inner,
            report: Mutex::new(PipelineReport::default()),
        }
    }

    pub fn snapshot(&self) -> PipelineReport {
        *self
            .report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for ReportingEventSink {
    fn record(&self, event: PipelineEvent) {
        self.report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .apply(&event);
        self.inner.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlp_core::MemoryEventSink;
    use std::sync::Arc;

    #[test]
    fn test_counts_and_forwards() {
        let inner = Arc::new(MemoryEventSink::new());
        let sink = ReportingEventSink::new(inner.clone());

        sink.record(PipelineEvent::FileCompleted {
            filename: "a.txt".to_string(),
            chunks: 3,
        });
        sink.record(PipelineEvent::FileReadFailed {
            filename: "b.txt".to_string(),
            chunks_emitted: 2,
            reason: "reset".to_string(),
        });
        sink.record(PipelineEvent::StreamOpenFailed {
            filename: "c.txt".to_string(),
            reason: "denied".to_string(),
        });

        let report = sink.snapshot();
        assert_eq!(report.chunks_read, 5);
        assert_eq!(report.files_failed, 2);
        assert_eq!(inner.events().len(), 3);
    }
}

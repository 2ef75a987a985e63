//! Stage wiring
//!
//! Every stage runs as its own task and hands records to the next over a
//! bounded channel, so a slow stage applies backpressure upstream. Stopping
//! discovery closes the first channel; each stage then drains and closes its
//! output in turn, the grouper fires whatever panes are still open, and the
//! writer finishes the last shards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dlp_core::{
    Chunk, Compression, FileHandle, PipelineEvent, RedactedChunk, RetryConfig, SharedEventSink,
    ShardNaming, Window,
};
use dlp_security::{DeidentifyClient, RedactionSettings, Redactor};
use dlp_sources::{ChunkedReader, DiscoveryMode, ExcludeFilter, FileDiscoverer, SourceError};
use dlp_storage::{ObjectStore, ShardSink};
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::report::{PipelineReport, ReportingEventSink};
use crate::window::{WindowSettings, WindowedGrouper};
use crate::writer::DynamicWriter;
use crate::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub pattern: String,
    pub poll_interval: Duration,
    pub exclude: Vec<String>,
    pub mode: DiscoveryMode,

    pub batch_size: usize,
    pub compression: Compression,

    pub redaction: RedactionSettings,
    pub redaction_retry: RetryConfig,
    pub redaction_timeout: Duration,

    pub window: WindowSettings,

    pub output_root: PathBuf,
    pub suffix: String,
    pub naming: ShardNaming,
    pub write_retry: RetryConfig,
    pub write_timeout: Duration,

    pub max_open_files: usize,
    pub max_inflight_redactions: usize,
    pub channel_capacity: usize,
}

impl PipelineOptions {
    pub fn new(
        pattern: impl Into<String>,
        output_root: impl Into<PathBuf>,
        redaction: RedactionSettings,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            poll_interval: FileDiscoverer::DEFAULT_POLL_INTERVAL,
            exclude: Vec::new(),
            mode: DiscoveryMode::Continuous,
            batch_size: ChunkedReader::DEFAULT_BATCH_SIZE,
            compression: Compression::Auto,
            redaction,
            redaction_retry: RetryConfig::default(),
            redaction_timeout: Redactor::DEFAULT_TIMEOUT,
            window: WindowSettings::default(),
            output_root: output_root.into(),
            suffix: DynamicWriter::DEFAULT_SUFFIX.to_string(),
            naming: ShardNaming::Key,
            write_retry: RetryConfig {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(30),
                backoff_multiplier: 2.0,
            },
            write_timeout: DynamicWriter::DEFAULT_TIMEOUT,
            max_open_files: 4,
            max_inflight_redactions: 16,
            channel_capacity: 256,
        }
    }
}

pub struct Pipeline {
    options: PipelineOptions,
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn ShardSink>,
    client: Arc<dyn DeidentifyClient>,
    events: SharedEventSink,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn ShardSink>,
        client: Arc<dyn DeidentifyClient>,
        events: SharedEventSink,
    ) -> Self {
        Self {
            options,
            store,
            sink,
            client,
            events,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run until `cancel` fires (or after one listing in once mode) and every
    /// stage has drained
    ///
    /// Returns an error only for an invalid discovery pattern or an output
    /// shard that could not be written.
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineReport> {
        let reporting = Arc::new(ReportingEventSink::new(self.events.clone()));
        let events: SharedEventSink = reporting.clone();
        let opts = self.options;
        let capacity = opts.channel_capacity.max(1);
        let stop = cancel.child_token();

        let discoverer = FileDiscoverer::new(self.store.clone(), opts.pattern.clone(), events.clone())
            .with_poll_interval(opts.poll_interval)
            .with_exclude(ExcludeFilter::new(&opts.exclude));
        let reader = ChunkedReader::new(self.store.clone(), events.clone())
            .with_batch_size(opts.batch_size)
            .with_compression(opts.compression);
        let redactor = Redactor::new(self.client.clone(), opts.redaction.clone(), events.clone())
            .with_retry(opts.redaction_retry.clone())
            .with_timeout(opts.redaction_timeout);
        let grouper = WindowedGrouper::new(opts.window.clone(), events.clone());
        let writer = DynamicWriter::new(self.sink.clone(), opts.output_root.clone(), events.clone())
            .with_suffix(opts.suffix.clone())
            .with_naming(opts.naming)
            .with_retry(opts.write_retry.clone())
            .with_timeout(opts.write_timeout);

        let (file_tx, file_rx) = mpsc::channel(capacity);
        let (chunk_tx, chunk_rx) = mpsc::channel(capacity);
        let (redacted_tx, redacted_rx) = mpsc::channel(capacity);
        let (group_tx, group_rx) = mpsc::channel(capacity);

        tracing::info!(pattern = %opts.pattern, mode = ?opts.mode, "Starting pipeline");

        let discovery = tokio::spawn(discoverer.run(file_tx, stop.clone(), opts.mode));
        let reading = tokio::spawn(read_files(
            Arc::new(reader),
            file_rx,
            chunk_tx,
            opts.max_open_files,
        ));
        let redacting = tokio::spawn(redact_chunks(
            Arc::new(redactor),
            chunk_rx,
            redacted_tx,
            opts.max_inflight_redactions,
            Discards::new(events.clone(), opts.window.length),
        ));
        let grouping = tokio::spawn(grouper.run(redacted_rx, group_tx));

        let written = writer.run(group_rx).await;
        if written.is_err() {
            stop.cancel();
        }

        let discovered = joined(discovery.await)?;
        joined(reading.await)?;
        joined(redacting.await)?;
        joined(grouping.await)?;

        let report = reporting.snapshot();
        tracing::info!(%report, "Pipeline stopped");

        written?;
        discovered?;
        Ok(report)
    }
}

async fn read_files(
    reader: Arc<ChunkedReader>,
    mut rx: mpsc::Receiver<FileHandle>,
    tx: mpsc::Sender<Chunk>,
    max_open_files: usize,
) {
    let permits = Arc::new(Semaphore::new(max_open_files.max(1)));
    let mut tasks = JoinSet::new();

    while let Some(handle) = rx.recv().await {
        if tx.is_closed() {
            break;
        }
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let (reader, tx) = (reader.clone(), tx.clone());
        tasks.spawn(async move {
            let _permit = permit;
            // Open and read failures are recorded by the reader and stay with that file
            if let Err(e @ SourceError::Task(_)) = reader.read_into(handle, tx).await {
                tracing::error!(error = %e, "Reader task failed");
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
}

/// Records chunks dropped because the grouper is no longer receiving
#[derive(Clone)]
struct Discards {
    events: SharedEventSink,
    window_length: Duration,
}

impl Discards {
    fn new(events: SharedEventSink, window_length: Duration) -> Self {
        Self {
            events,
            window_length,
        }
    }

    fn record(&self, filename: String, sequence: u64, timestamp_ms: i64) {
        let length_ms = i64::try_from(self.window_length.as_millis()).unwrap_or(i64::MAX);
        self.events.record(PipelineEvent::ChunkDiscarded {
            filename,
            sequence,
            window: Window::containing(timestamp_ms, length_ms),
        });
    }
}

async fn redact_chunks(
    redactor: Arc<Redactor>,
    mut rx: mpsc::Receiver<Chunk>,
    tx: mpsc::Sender<RedactedChunk>,
    max_inflight: usize,
    discards: Discards,
) {
    let permits = Arc::new(Semaphore::new(max_inflight.max(1)));
    let mut tasks = JoinSet::new();

    while let Some(chunk) = rx.recv().await {
        // Keep draining so every chunk still queued is accounted for
        if tx.is_closed() {
            let timestamp_ms = chunk.timestamp_ms();
            discards.record(chunk.filename, chunk.sequence, timestamp_ms);
            continue;
        }
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let (redactor, tx, discards) = (redactor.clone(), tx.clone(), discards.clone());
        tasks.spawn(async move {
            let _permit = permit;
            // Failed chunks are reported by the redactor and never forwarded
            if let Ok(redacted) = redactor.redact(chunk).await {
                if let Err(SendError(redacted)) = tx.send(redacted).await {
                    let timestamp_ms = redacted.timestamp_ms();
                    discards.record(redacted.filename, redacted.sequence, timestamp_ms);
                }
            }
        });

        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
}

fn joined<T>(result: std::result::Result<T, JoinError>) -> Result<T> {
    result.map_err(|e| PipelineError::Task(e.to_string()))
}

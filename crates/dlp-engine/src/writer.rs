//! Per-key shard writing
//!
//! A key's first shard in a run takes the plain name. A later shard that
//! would land on a path already written in this run is qualified with its
//! window instead, so no fired group replaces another.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dlp_core::retry::retry;
use dlp_core::{
    OutputShard, PipelineEvent, RetryConfig, RetryOutcome, SharedEventSink, ShardNaming,
    WindowedGroup,
};
use dlp_storage::{ShardSink, StorageError};
use tokio::sync::mpsc;

use crate::{PipelineError, Result};

pub struct DynamicWriter {
    sink: Arc<dyn ShardSink>,
    root: PathBuf,
    suffix: String,
    naming: ShardNaming,
    retry: RetryConfig,
    timeout: Duration,
    events: SharedEventSink,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DynamicWriter {
    pub const DEFAULT_SUFFIX: &'static str = ".txt";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(sink: Arc<dyn ShardSink>, root: impl Into<PathBuf>, events: SharedEventSink) -> Self {
        Self {
            sink,
            root: root.into(),
            suffix: Self::DEFAULT_SUFFIX.to_string(),
            naming: ShardNaming::Key,
            retry: RetryConfig {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(30),
                backoff_multiplier: 2.0,
            },
            timeout: Self::DEFAULT_TIMEOUT,
            events,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_naming(mut self, naming: ShardNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination of the single shard for `group`
    pub fn shard_path(&self, group: &WindowedGroup) -> Result<PathBuf> {
        let name = self
            .naming
            .shard_name(&group.filename, &group.window, &self.suffix)?;
        Ok(self.root.join(name))
    }

    /// Reserve an output path for `group` that no earlier shard of this run used
    fn claim_path(&self, group: &WindowedGroup) -> Result<PathBuf> {
        let preferred = self.shard_path(group)?;
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if claimed.insert(preferred.clone()) {
            return Ok(preferred);
        }

        let windowed = ShardNaming::Windowed.shard_name(&group.filename, &group.window, &self.suffix)?;
        let mut path = self.root.join(&windowed);
        let stem = windowed.strip_suffix(self.suffix.as_str()).unwrap_or(&windowed);
        let mut index = 1u32;
        while !claimed.insert(path.clone()) {
            path = self.root.join(format!("{}.{}{}", stem, index, self.suffix));
            index += 1;
        }

        tracing::debug!(
            filename = %group.filename,
            preferred = %preferred.display(),
            path = %path.display(),
            "Shard name already used in this run, qualifying it"
        );
        Ok(path)
    }

    /// Write one group as exactly one shard
    ///
    /// Exhausting the retries is a run-level failure.
    pub async fn write(&self, group: WindowedGroup) -> Result<OutputShard> {
        let path = self.claim_path(&group)?;
        let contents = group.contents();

        let outcome = retry(&self.retry, |_attempt| {
            let (path, contents) = (&path, &contents);
            async move {
                match tokio::time::timeout(self.timeout, self.sink.write(path, contents.as_bytes()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StorageError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("write timed out after {:?}", self.timeout),
                    ))),
                }
            }
        })
        .await;

        let display = path.display().to_string();
        match outcome {
            RetryOutcome::Success { attempts, .. } => {
                self.events.record(PipelineEvent::ShardWritten {
                    filename: group.filename.clone(),
                    path: display,
                    bytes: contents.len(),
                    attempts,
                });
                Ok(OutputShard {
                    filename: group.filename,
                    window: group.window,
                    path,
                    bytes: contents.len(),
                })
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                self.events.record(PipelineEvent::ShardWriteFailed {
                    filename: group.filename,
                    path: display.clone(),
                    attempts,
                    reason: last_error.to_string(),
                });
                Err(PipelineError::Write {
                    path: display,
                    attempts,
                    source: last_error,
                })
            }
        }
    }

    /// Write groups from `rx` in firing order until it closes or a write fails
    pub async fn run(self, mut rx: mpsc::Receiver<WindowedGroup>) -> Result<usize> {
        let mut written = 0usize;

        while let Some(group) = rx.recv().await {
            self.write(group).await?;
            written += 1;
        }

        Ok(written)
    }
}

//! Continuous discovery of new input files

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dlp_core::{FileHandle, PipelineEvent, SharedEventSink};
use dlp_storage::{ObjectStore, StorageError};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{ExcludeFilter, Result, SourceError};

/// Whether discovery keeps polling after the first listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Poll forever until cancelled
    Continuous,
    /// A single listing, then stop
    Once,
}

/// Polls the object store and emits every matching file exactly once
pub struct FileDiscoverer {
    store: Arc<dyn ObjectStore>,
    pattern: String,
    poll_interval: Duration,
    exclude: ExcludeFilter,
    seen: HashSet<String>,
    events: SharedEventSink,
}

impl FileDiscoverer {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

    pub fn new(
        store: Arc<dyn ObjectStore>,
        pattern: impl Into<String>,
        events: SharedEventSink,
    ) -> Self {
        Self {
            store,
            pattern: pattern.into(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            exclude: ExcludeFilter::default(),
            seen: HashSet::new(),
            events,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_exclude(mut self, exclude: ExcludeFilter) -> Self {
        self.exclude = exclude;
        self
    }

    /// One listing call; returns only handles not emitted before
    pub async fn poll(&mut self) -> std::result::Result<Vec<FileHandle>, StorageError> {
        let listed = self.store.list(&self.pattern).await?;
        let mut fresh = Vec::new();

        for handle in listed {
            if self.exclude.is_excluded(&handle.filename, &handle.resource_id) {
                continue;
            }

            if self.seen.insert(handle.resource_id.clone()) {
                self.events.record(PipelineEvent::FileDiscovered {
                    filename: handle.filename.clone(),
                    resource_id: handle.resource_id.clone(),
                });
                fresh.push(handle);
            }
        }

        Ok(fresh)
    }

    /// Poll on a fixed interval, sending new files into `tx`
    ///
    /// Listing failures are reported and retried on the next tick; only an
    /// invalid pattern ends discovery with an error. Returns the number of
    /// files emitted once cancelled, once the receiver is dropped, or after
    /// the single listing of [`DiscoveryMode::Once`].
    pub async fn run(
        mut self,
        tx: mpsc::Sender<FileHandle>,
        cancel: CancellationToken,
        mode: DiscoveryMode,
    ) -> Result<usize> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut emitted = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = self.poll() => polled,
            };

            match polled {
                Ok(handles) => {
                    for handle in handles {
                        // A full channel must not hold up shutdown
                        let sent = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Ok(emitted),
                            sent = tx.send(handle) => sent,
                        };
                        if sent.is_err() {
                            return Ok(emitted);
                        }
                        emitted += 1;
                    }
                }
                Err(e) if e.is_fatal() => return Err(SourceError::Listing(e)),
                Err(e) => self.events.record(PipelineEvent::ListingFailed {
                    pattern: self.pattern.clone(),
                    reason: e.to_string(),
                }),
            }

            if mode == DiscoveryMode::Once {
                break;
            }
        }

        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dlp_core::MemoryEventSink;
    use dlp_storage::LocalObjectStore;
    use std::io::Read;
    use std::sync::Mutex;

    /// Store returning scripted listing results, one per call
    struct ScriptedStore {
        listings: Mutex<Vec<std::result::Result<Vec<&'static str>, std::io::ErrorKind>>>,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn list(&self, _pattern: &str) -> dlp_storage::Result<Vec<FileHandle>> {
            let next = {
                let mut listings = self.listings.lock().unwrap();
                if listings.is_empty() {
                    Ok(Vec::new())
                } else {
                    listings.remove(0)
                }
            };

            match next {
                Ok(ids) => Ok(ids.into_iter().map(FileHandle::new).collect()),
                Err(kind) => Err(std::io::Error::new(kind, "listing failed").into()),
            }
        }

        fn open(&self, handle: &FileHandle) -> dlp_storage::Result<Box<dyn Read + Send>> {
            Err(StorageError::NotFound(handle.resource_id.clone()))
        }
    }

    #[tokio::test]
    async fn test_poll_deduplicates_across_cycles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let events = Arc::new(MemoryEventSink::new());
        let pattern = format!("{}/*.txt", dir.path().display());
        let mut discoverer =
            FileDiscoverer::new(Arc::new(LocalObjectStore::new()), pattern, events.clone());

        let first = discoverer.poll().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].filename, "a.txt");

        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        let second = discoverer.poll().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].filename, "b.txt");

        assert!(discoverer.poll().await.unwrap().is_empty());
        assert_eq!(
            events.count(|e| matches!(e, PipelineEvent::FileDiscovered { .. })),
            2
        );
    }

    #[tokio::test]
    async fn test_poll_applies_exclude_filter() {
        let store = ScriptedStore {
            listings: Mutex::new(vec![Ok(vec!["/in/a.txt", "/in/a.txt.tmp"])]),
        };
        let mut discoverer = FileDiscoverer::new(
            Arc::new(store),
            "/in/*",
            Arc::new(MemoryEventSink::new()),
        )
        .with_exclude(ExcludeFilter::new(&["*.tmp".to_string()]));

        let files = discoverer.poll().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.txt");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_listing_error_is_retried_next_tick() {
        let store = ScriptedStore {
            listings: Mutex::new(vec![
                Ok(vec!["/in/a.txt"]),
                Err(std::io::ErrorKind::TimedOut),
                Ok(vec!["/in/a.txt", "/in/b.txt"]),
            ]),
        };
        let events = Arc::new(MemoryEventSink::new());
        let discoverer = FileDiscoverer::new(Arc::new(store), "/in/*.txt", events.clone())
            .with_poll_interval(Duration::from_secs(300));

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(discoverer.run(tx, cancel.clone(), DiscoveryMode::Continuous));

        assert_eq!(rx.recv().await.unwrap().filename, "a.txt");
        assert_eq!(rx.recv().await.unwrap().filename, "b.txt");

        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap(), 2);
        assert_eq!(
            events.count(|e| matches!(e, PipelineEvent::ListingFailed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_once_mode_stops_after_first_listing() {
        let store = ScriptedStore {
            listings: Mutex::new(vec![Ok(vec!["/in/a.txt", "/in/b.txt"])]),
        };
        let discoverer =
            FileDiscoverer::new(Arc::new(store), "/in/*.txt", Arc::new(MemoryEventSink::new()));

        let (tx, mut rx) = mpsc::channel(8);
        let emitted = discoverer
            .run(tx, CancellationToken::new(), DiscoveryMode::Once)
            .await
            .unwrap();

        assert_eq!(emitted, 2);
        let mut names = Vec::new();
        while let Some(handle) = rx.recv().await {
            names.push(handle.filename);
        }
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_invalid_pattern_halts_discovery() {
        let discoverer = FileDiscoverer::new(
            Arc::new(LocalObjectStore::new()),
            "/in/[unclosed",
            Arc::new(MemoryEventSink::new()),
        );

        let (tx, _rx) = mpsc::channel(1);
        let err = discoverer
            .run(tx, CancellationToken::new(), DiscoveryMode::Continuous)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Listing(StorageError::InvalidPattern(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_blocked_send() {
        let store = ScriptedStore {
            listings: Mutex::new(vec![Ok(vec!["/in/a.txt", "/in/b.txt", "/in/c.txt"])]),
        };
        let discoverer =
            FileDiscoverer::new(Arc::new(store), "/in/*.txt", Arc::new(MemoryEventSink::new()));

        // Nobody receives, so the second send waits on a full channel
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(discoverer.run(tx, cancel.clone(), DiscoveryMode::Continuous));

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let emitted = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(emitted, 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let discoverer = FileDiscoverer::new(
            Arc::new(ScriptedStore {
                listings: Mutex::new(Vec::new()),
            }),
            "/in/*.txt",
            Arc::new(MemoryEventSink::new()),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel(1);

        let emitted = discoverer
            .run(tx, cancel, DiscoveryMode::Continuous)
            .await
            .unwrap();
        assert_eq!(emitted, 0);
    }
}

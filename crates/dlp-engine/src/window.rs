//! Fixed-window grouping of redacted chunks by filename
//!
//! Each `(filename, window)` pair is a pane. A pane opens when its first
//! chunk arrives, fires once `fire_delay` after that arrival, and closes
//! when the window end plus the allowed lateness has passed. Chunks for a
//! fired pane are discarded; chunks for a closed window are dropped as late.
//!
//! All timestamps are unix milliseconds. The state machine takes `now` as an
//! argument so it can be driven without a clock; [`WindowedGrouper::run`]
//! drives it with wall-clock time.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future;
use std::time::Duration;

use dlp_core::model::unix_millis;
use dlp_core::{GroupOrdering, PipelineEvent, RedactedChunk, SharedEventSink, Window, WindowedGroup};
use time::OffsetDateTime;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    pub length: Duration,
    pub fire_delay: Duration,
    pub allowed_lateness: Duration,
    pub ordering: GroupOrdering,
}

impl WindowSettings {
    /// Long enough for the chunks of one file redacted together to share a pane
    pub const DEFAULT_FIRE_DELAY: Duration = Duration::from_secs(5);
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            length: Duration::from_secs(60),
            fire_delay: Self::DEFAULT_FIRE_DELAY,
            allowed_lateness: Duration::ZERO,
            ordering: GroupOrdering::Sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneState {
    Open,
    Fired,
    Closed,
}

/// What happened to an incoming chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Window already closed
    Late,
    /// Pane already fired
    Discarded,
}

#[derive(Debug)]
struct Pane {
    window: Window,
    state: PaneState,
    fire_at_ms: i64,
    elements: Vec<(u64, String)>,
}

pub struct WindowedGrouper {
    length_ms: i64,
    fire_delay_ms: i64,
    allowed_lateness_ms: i64,
    ordering: GroupOrdering,
    panes: HashMap<(String, i64), Pane>,
    events: SharedEventSink,
}

impl WindowedGrouper {
    pub fn new(settings: WindowSettings, events: SharedEventSink) -> Self {
        Self {
            length_ms: millis(settings.length).max(1),
            fire_delay_ms: millis(settings.fire_delay),
            allowed_lateness_ms: millis(settings.allowed_lateness),
            ordering: settings.ordering,
            panes: HashMap::new(),
            events,
        }
    }

    /// State of the pane holding `filename` at `timestamp_ms`
    pub fn pane_state(&self, filename: &str, timestamp_ms: i64, now_ms: i64) -> PaneState {
        let window = Window::containing(timestamp_ms, self.length_ms);

        match self.panes.get(&(filename.to_string(), window.start_ms)) {
            Some(pane) => pane.state,
            None if now_ms >= self.close_at(&window) => PaneState::Closed,
            None => PaneState::Open,
        }
    }

    pub fn accept(&mut self, chunk: RedactedChunk, now_ms: i64) -> Admission {
        let window = Window::containing(chunk.timestamp_ms(), self.length_ms);
        let close_at = self.close_at(&window);

        if now_ms >= close_at {
            self.events.record(PipelineEvent::LateChunkDropped {
                filename: chunk.filename,
                sequence: chunk.sequence,
                window,
            });
            return Admission::Late;
        }

        match self.panes.entry((chunk.filename.clone(), window.start_ms)) {
            Entry::Occupied(entry) if entry.get().state == PaneState::Fired => {
                self.events.record(PipelineEvent::ChunkDiscarded {
                    filename: chunk.filename,
                    sequence: chunk.sequence,
                    window,
                });
                Admission::Discarded
            }
            Entry::Occupied(mut entry) => {
                entry.get_mut().elements.push((chunk.sequence, chunk.text));
                Admission::Accepted
            }
            Entry::Vacant(entry) => {
                // A pane fires no later than its window closes
                let fire_at_ms = now_ms.saturating_add(self.fire_delay_ms).min(close_at);
                entry.insert(Pane {
                    window,
                    state: PaneState::Open,
                    fire_at_ms,
                    elements: vec![(chunk.sequence, chunk.text)],
                });
                Admission::Accepted
            }
        }
    }

    /// Fire every open pane whose trigger time has passed and forget closed panes
    pub fn fire_due(&mut self, now_ms: i64) -> Vec<WindowedGroup> {
        let mut fired = Vec::new();

        for ((filename, _), pane) in self.panes.iter_mut() {
            if pane.state == PaneState::Open && pane.fire_at_ms <= now_ms {
                pane.state = PaneState::Fired;
                fired.push(Self::group(
                    filename.clone(),
                    pane,
                    self.ordering,
                    &self.events,
                ));
            }
        }

        let lateness = self.allowed_lateness_ms;
        self.panes.retain(|_, pane| {
            pane.state == PaneState::Open || now_ms < pane.window.end_ms.saturating_add(lateness)
        });

        sort_groups(&mut fired);
        fired
    }

    /// Fire every pane that has not fired yet, regardless of trigger time
    pub fn flush(&mut self) -> Vec<WindowedGroup> {
        let mut fired = Vec::new();

        for ((filename, _), mut pane) in self.panes.drain() {
            if pane.state == PaneState::Open {
                fired.push(Self::group(filename, &mut pane, self.ordering, &self.events));
            }
        }

        sort_groups(&mut fired);
        fired
    }

    /// Earliest time at which `fire_due` has work to do
    pub fn next_deadline(&self) -> Option<i64> {
        self.panes
            .values()
            .map(|pane| match pane.state {
                PaneState::Open => pane.fire_at_ms,
                _ => self.close_at(&pane.window),
            })
            .min()
    }

    pub fn open_panes(&self) -> usize {
        self.panes
            .values()
            .filter(|pane| pane.state == PaneState::Open)
            .count()
    }

    /// Record every chunk held by an open pane as discarded and forget all panes
    pub fn discard_open(&mut self) -> usize {
        let mut discarded = 0usize;

        for ((filename, _), pane) in self.panes.drain() {
            if pane.state != PaneState::Open {
                continue;
            }
            for (sequence, _) in pane.elements {
                self.events.record(PipelineEvent::ChunkDiscarded {
                    filename: filename.clone(),
                    sequence,
                    window: pane.window,
                });
                discarded += 1;
            }
        }

        discarded
    }

    /// Group redacted chunks from `rx` and send fired groups to `tx`
    ///
    /// Panes still open when `rx` closes are fired before returning. If `tx`
    /// closes first, held and later chunks are recorded as discarded until
    /// `rx` closes.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<RedactedChunk>,
        tx: mpsc::Sender<WindowedGroup>,
    ) -> usize {
        let mut sent = 0usize;

        loop {
            let now = now_ms();
            for group in self.fire_due(now) {
                if tx.send(group).await.is_err() {
                    self.discard_remaining(rx).await;
                    return sent;
                }
                sent += 1;
            }

            let wait = self
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(now).max(0) as u64));

            tokio::select! {
                received = rx.recv() => match received {
                    Some(chunk) => {
                        self.accept(chunk, now_ms());
                        // Admit everything already queued before the next firing
                        while let Ok(chunk) = rx.try_recv() {
                            self.accept(chunk, now_ms());
                        }
                    }
                    None => break,
                },
                _ = sleep_until_deadline(wait) => {}
            }
        }

        for group in self.flush() {
            if tx.send(group).await.is_err() {
                break;
            }
            sent += 1;
        }

        sent
    }

    async fn discard_remaining(mut self, mut rx: mpsc::Receiver<RedactedChunk>) {
        self.discard_open();

        while let Some(chunk) = rx.recv().await {
            let window = Window::containing(chunk.timestamp_ms(), self.length_ms);
            self.events.record(PipelineEvent::ChunkDiscarded {
                filename: chunk.filename,
                sequence: chunk.sequence,
                window,
            });
        }
    }

    fn close_at(&self, window: &Window) -> i64 {
        window.end_ms.saturating_add(self.allowed_lateness_ms)
    }

    fn group(
        filename: String,
        pane: &mut Pane,
        ordering: GroupOrdering,
        events: &SharedEventSink,
    ) -> WindowedGroup {
        let mut elements = std::mem::take(&mut pane.elements);
        if ordering == GroupOrdering::Sequence {
            elements.sort_by_key(|(sequence, _)| *sequence);
        }

        events.record(PipelineEvent::WindowFired {
            filename: filename.clone(),
            window: pane.window,
            chunks: elements.len(),
        });

        WindowedGroup {
            filename,
            window: pane.window,
            texts: elements.into_iter().map(|(_, text)| text).collect(),
        }
    }
}

fn sort_groups(groups: &mut [WindowedGroup]) {
    groups.sort_by(|a, b| (a.window, &a.filename).cmp(&(b.window, &b.filename)));
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn now_ms() -> i64 {
    unix_millis(OffsetDateTime::now_utc())
}

async fn sleep_until_deadline(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => future::pending().await,
    }
}

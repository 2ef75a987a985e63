//! Fixed-size chunked reading of input files

use std::io::{self, Read};
use std::sync::Arc;

use dlp_core::{Chunk, Compression, FileHandle, PipelineEvent, SharedEventSink};
use dlp_storage::{ObjectStore, StorageError};
use tokio::sync::mpsc;

use crate::compression;
use crate::{Result, SourceError};

/// Reads a file into buffers of `batch_size` bytes, one chunk per buffer
///
/// Each buffer is filled completely before it is emitted, so a non-empty
/// file of N bytes yields `ceil(N / batch_size)` chunks unless a multi-byte
/// UTF-8 character straddles a boundary; such a character is carried over
/// whole into the next chunk.
pub struct ChunkedReader {
    store: Arc<dyn ObjectStore>,
    batch_size: usize,
    compression: Compression,
    events: SharedEventSink,
}

impl ChunkedReader {
    pub const DEFAULT_BATCH_SIZE: usize = 51_200;

    pub fn new(store: Arc<dyn ObjectStore>, events: SharedEventSink) -> Self {
        Self {
            store,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            compression: Compression::Auto,
            events,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Read `handle` to exhaustion, handing each chunk to `emit`
    ///
    /// Blocking. `emit` returns `false` when the consumer has gone away.
    /// The underlying stream is dropped on every return path.
    pub fn read_with<F>(&self, handle: &FileHandle, mut emit: F) -> Result<usize>
    where
        F: FnMut(Chunk) -> bool,
    {
        let filename = handle.filename.clone();

        let mut reader = self
            .store
            .open(handle)
            .and_then(|raw| {
                compression::decoder(self.compression, &filename, raw).map_err(StorageError::from)
            })
            .map_err(|source| {
                self.events.record(PipelineEvent::StreamOpenFailed {
                    filename: filename.clone(),
                    reason: source.to_string(),
                });
                SourceError::Open {
                    filename: filename.clone(),
                    source,
                }
            })?;

        let mut buffer = vec![0u8; self.batch_size];
        let mut carried = 0usize;
        let mut emitted = 0usize;

        loop {
            let filled = fill(&mut reader, &mut buffer[carried..]).map_err(|source| {
                self.events.record(PipelineEvent::FileReadFailed {
                    filename: filename.clone(),
                    chunks_emitted: emitted,
                    reason: source.to_string(),
                });
                SourceError::Read {
                    filename: filename.clone(),
                    chunks_emitted: emitted,
                    source,
                }
            })?;

            let total = carried + filled;
            if total == 0 {
                break;
            }

            let at_eof = total < buffer.len();
            let keep = if at_eof {
                0
            } else {
                match incomplete_utf8_tail(&buffer[..total]) {
                    tail if tail == total => 0,
                    tail => tail,
                }
            };

            let cut = total - keep;
            let text = String::from_utf8_lossy(&buffer[..cut]).trim().to_string();
            let chunk = Chunk::new(filename.clone(), emitted as u64, text);

            if !emit(chunk) {
                return Err(SourceError::ChannelClosed(filename));
            }
            emitted += 1;

            buffer.copy_within(cut..total, 0);
            carried = keep;

            if at_eof {
                break;
            }
        }

        self.events.record(PipelineEvent::FileCompleted {
            filename,
            chunks: emitted,
        });

        Ok(emitted)
    }

    /// Read `handle` on the blocking pool, sending chunks into `tx`
    pub async fn read_into(
        self: Arc<Self>,
        handle: FileHandle,
        tx: mpsc::Sender<Chunk>,
    ) -> Result<usize> {
        tokio::task::spawn_blocking(move || {
            self.read_with(&handle, |chunk| tx.blocking_send(chunk).is_ok())
        })
        .await
        .map_err(|e| SourceError::Task(e.to_string()))?
    }
}

/// Fill `buf` completely unless the reader hits end of stream first
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Length of a truncated multi-byte sequence at the end of `bytes`
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let len = bytes.len();

    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep looking for the lead
            continue;
        }

        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }

    0
}

//! Records passed between pipeline stages

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::{Error, Result};

/// A discovered input object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle {
    /// Last path segment of the object; the routing key end-to-end
    pub filename: String,
    /// Opaque identifier the object store can open again
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl FileHandle {
    pub fn new(resource_id: impl Into<String>) -> Self {
        let resource_id = resource_id.into();
        Self {
            filename: filename_of(&resource_id).to_string(),
            resource_id,
            size_bytes: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// Final segment of a `/` or `\` separated resource identifier
pub fn filename_of(resource_id: &str) -> &str {
    let trimmed = resource_id.trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

/// A bounded slice of one file's decoded text
///
/// Chunk boundaries are byte-count cuts, not record boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub filename: String,
    /// Zero-based position of this chunk within its file
    pub sequence: u64,
    pub text: String,
    /// When the chunk was read; the event time used for windowing
    pub read_at: OffsetDateTime,
}

impl Chunk {
    pub fn new(filename: impl Into<String>, sequence: u64, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            sequence,
            text: text.into(),
            read_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_read_at(mut self, read_at: OffsetDateTime) -> Self {
        self.read_at = read_at;
        self
    }

    pub fn timestamp_ms(&self) -> i64 {
        unix_millis(self.read_at)
    }

    /// Pair redacted text with this chunk's key, sequence and event time
    pub fn into_redacted(self, text: String) -> RedactedChunk {
        RedactedChunk {
            filename: self.filename,
            sequence: self.sequence,
            text,
            read_at: self.read_at,
        }
    }
}

/// A chunk whose text came back from the de-identify service
#[derive(Debug, Clone, PartialEq)]
pub struct RedactedChunk {
    pub filename: String,
    pub sequence: u64,
    pub text: String,
    pub read_at: OffsetDateTime,
}

impl RedactedChunk {
    pub fn timestamp_ms(&self) -> i64 {
        unix_millis(self.read_at)
    }
}

pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// A fixed, non-overlapping processing interval `[start_ms, end_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Window {
    /// Epoch-aligned tumbling window of `length_ms` containing `timestamp_ms`
    pub fn containing(timestamp_ms: i64, length_ms: i64) -> Self {
        let length_ms = length_ms.max(1);
        let start_ms = timestamp_ms.div_euclid(length_ms) * length_ms;
        Self {
            start_ms,
            end_ms: start_ms + length_ms,
        }
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }

    fn label(millis: i64) -> String {
        let format =
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .ok()
            .and_then(|at| at.format(format).ok())
            .unwrap_or_else(|| millis.to_string())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", Self::label(self.start_ms), Self::label(self.end_ms))
    }
}

/// All redacted text for one filename within one fired window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedGroup {
    pub filename: String,
    pub window: Window,
    pub texts: Vec<String>,
}

impl WindowedGroup {
    /// Text-sink serialization: one line per grouped element
    pub fn contents(&self) -> String {
        let mut out = String::with_capacity(self.texts.iter().map(|t| t.len() + 1).sum());
        for text in &self.texts {
            out.push_str(text);
            out.push('\n');
        }
        out
    }
}

/// Where a group ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputShard {
    pub filename: String,
    pub window: Window,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Shard file naming scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardNaming {
    /// `<key><suffix>`
    #[default]
    Key,
    /// `<key>-<windowStart>-<windowEnd>-00000-of-00001<suffix>`
    Windowed,
}

impl ShardNaming {
    pub fn shard_name(&self, key: &str, window: &Window, suffix: &str) -> Result<String> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(Error::InvalidKey(key.to_string()));
        }

        Ok(match self {
            ShardNaming::Key => format!("{}{}", key, suffix),
            ShardNaming::Windowed => format!("{}-{}-00000-of-00001{}", key, window, suffix),
        })
    }
}

impl FromStr for ShardNaming {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "key" => Ok(ShardNaming::Key),
            "windowed" => Ok(ShardNaming::Windowed),
            other => Err(Error::InvalidConfig(format!("unknown shard naming: {}", other))),
        }
    }
}

/// Order of texts inside a fired group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrdering {
    /// By chunk sequence, reconstructing on-disk order for the chunks present
    #[default]
    Sequence,
    /// As redactions completed
    Arrival,
}

impl FromStr for GroupOrdering {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequence" => Ok(GroupOrdering::Sequence),
            "arrival" => Ok(GroupOrdering::Arrival),
            other => Err(Error::InvalidConfig(format!("unknown group ordering: {}", other))),
        }
    }
}

/// Input compression; `Auto` picks by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Auto,
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Resolve `Auto` against a filename; explicit choices pass through
    pub fn resolve(self, filename: &str) -> Compression {
        if self != Compression::Auto {
            return self;
        }

        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".gz") || lower.ends_with(".gzip") {
            Compression::Gzip
        } else if lower.ends_with(".zst") || lower.ends_with(".zstd") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Compression::Auto),
            "none" | "uncompressed" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zstd" | "zst" => Ok(Compression::Zstd),
            other => Err(Error::InvalidConfig(format!("unknown compression: {}", other))),
        }
    }
}

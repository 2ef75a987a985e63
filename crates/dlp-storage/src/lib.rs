//! Storage layer for dlp-stream
//!
//! This crate provides:
//! - `ObjectStore`: list objects by pattern and open them for reading
//! - `ShardSink`: write one named output shard
//! - Local filesystem implementations of both

pub mod error;
pub mod object;
pub mod sink;

pub use error::{Result, StorageError};
pub use object::{LocalObjectStore, ObjectStore};
pub use sink::{LocalShardSink, ShardSink};

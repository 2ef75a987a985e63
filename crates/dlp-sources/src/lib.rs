//! Input side of the pipeline
//!
//! - `FileDiscoverer`: polls the object store and emits newly matched files
//! - `ChunkedReader`: turns one file into fixed-size text chunks

pub mod compression;
pub mod discover;
pub mod error;
pub mod exclude;
pub mod reader;

pub use discover::{DiscoveryMode, FileDiscoverer};
pub use error::{Result, SourceError};
pub use exclude::ExcludeFilter;
pub use reader::ChunkedReader;

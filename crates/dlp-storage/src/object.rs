//! Object listing and reading

use std::fs::File;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use dlp_core::FileHandle;

use crate::{Result, StorageError};

/// Read side of the object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object currently matching `pattern`, sorted by resource id
    async fn list(&self, pattern: &str) -> Result<Vec<FileHandle>>;

    /// Open an object for sequential reading
    ///
    /// Blocking; callers run it off the async executor.
    fn open(&self, handle: &FileHandle) -> Result<Box<dyn Read + Send>>;
}

/// Object store backed by the local filesystem
///
/// Patterns are glob patterns, optionally prefixed with `file://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalObjectStore;

impl LocalObjectStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, pattern: &str) -> Result<Vec<FileHandle>> {
        let pattern = strip_scheme(pattern).to_string();

        tokio::task::spawn_blocking(move || expand_glob(&pattern))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    fn open(&self, handle: &FileHandle) -> Result<Box<dyn Read + Send>> {
        let path = strip_scheme(&handle.resource_id);

        match File::open(path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(handle.resource_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn strip_scheme(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}

fn expand_glob(pattern: &str) -> Result<Vec<FileHandle>> {
    let mut files = Vec::new();

    for entry in glob::glob(pattern)? {
        // Unreadable directories are skipped so one bad entry does not stall discovery
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable path while listing");
                continue;
            }
        };

        if let Some(handle) = handle_for(&path)? {
            files.push(handle);
        }
    }

    // Sort for determinism
    files.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));

    Ok(files)
}

fn handle_for(path: &Path) -> Result<Option<FileHandle>> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        // Deleted between glob and stat
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    Ok(Some(
        FileHandle::new(path.display().to_string()).with_size(metadata.len()),
    ))
}

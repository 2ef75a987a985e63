//! Output shard writing

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;

/// Write side of the object store
#[async_trait]
pub trait ShardSink: Send + Sync {
    /// Write `contents` as the complete object at `path`
    ///
    /// Readers must never observe a partially written object.
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Sink writing to the local filesystem via temp file + rename
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShardSink;

impl LocalShardSink {
    pub fn new() -> Self {
        Self
    }

    /// Temp file next to the target so the rename stays on one filesystem
    fn temp_path_for(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl ShardSink for LocalShardSink {
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_path_for(path);
        if let Err(e) = tokio::fs::write(&temp, contents).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("a.txt.txt");

        LocalShardSink::new().write(&path, b"redacted\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "redacted\n");
    }

    #[tokio::test]
    async fn test_write_replaces_whole_object_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt.txt");
        let sink = LocalShardSink::new();

        sink.write(&path, b"first version, longer").await.unwrap();
        sink.write(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

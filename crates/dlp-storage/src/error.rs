//! Error types for dlp-storage

use dlp_core::Retryable;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    /// Errors that will not go away on the next poll tick
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::InvalidPattern(_))
    }
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        match self {
            StorageError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
            ),
            StorageError::Task(_) => true,
            StorageError::InvalidPattern(_) | StorageError::NotFound(_) => false,
        }
    }
}

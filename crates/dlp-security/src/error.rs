//! Error types for dlp-security

use std::time::Duration;

use dlp_core::Retryable;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedactError>;

#[derive(Error, Debug)]
pub enum RedactError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("De-identify call returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("De-identify call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode de-identify response: {0}")]
    Decode(String),

    #[error("De-identify response carried no content")]
    MissingContent,

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl Retryable for RedactError {
    fn is_retryable(&self) -> bool {
        match self {
            RedactError::Transport(e) => !e.is_builder(),
            RedactError::Timeout(_) => true,
            // Throttling, request timeout and server-side failures
            RedactError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            RedactError::Decode(_) | RedactError::MissingContent | RedactError::Config(_) => {
                false
            }
        }
    }
}

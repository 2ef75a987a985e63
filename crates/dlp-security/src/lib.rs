//! Redaction stage of the pipeline
//!
//! [`Redactor`] wraps a [`DeidentifyClient`] with bounded retry and a per-call
//! timeout. Two clients ship with the crate: [`HttpDeidentifyClient`] for the
//! remote de-identify REST API and [`PatternDeidentifyClient`] for offline
//! regex-based redaction.

pub mod client;
pub mod error;
pub mod http;
pub mod patterns;
pub mod redactor;

pub use client::{DeidentifyClient, DeidentifyRequest, DeidentifyResponse, RedactionSettings};
pub use error::{RedactError, Result};
pub use http::HttpDeidentifyClient;
pub use patterns::PatternDeidentifyClient;
pub use redactor::Redactor;

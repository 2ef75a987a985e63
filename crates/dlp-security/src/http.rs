//! Client for the de-identify REST API

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{DeidentifyClient, DeidentifyRequest, DeidentifyResponse};
use crate::{RedactError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://dlp.googleapis.com/v2";

/// Pooled HTTP client; one instance is shared by all redaction workers
#[derive(Debug, Clone)]
pub struct HttpDeidentifyClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl HttpDeidentifyClient {
    pub fn new(
        endpoint: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dlp-stream/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RedactError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            access_token: access_token.filter(|t| !t.is_empty()),
        })
    }

    fn url_for(&self, parent: &str) -> String {
        format!(
            "{}/{}/content:deidentify",
            self.endpoint.trim_end_matches('/'),
            parent
        )
    }
}

#[async_trait]
impl DeidentifyClient for HttpDeidentifyClient {
    async fn deidentify(&self, request: &DeidentifyRequest) -> Result<DeidentifyResponse> {
        let mut builder = self
            .http
            .post(self.url_for(&request.parent))
            .json(&request.body());

        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RedactError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        parse_response(&body)
    }
}

#[derive(Deserialize)]
struct WireResponse {
    item: Option<WireItem>,
}

#[derive(Deserialize)]
struct WireItem {
    value: Option<String>,
}

fn parse_response(body: &[u8]) -> Result<DeidentifyResponse> {
    let wire: WireResponse =
        serde_json::from_slice(body).map_err(|e| RedactError::Decode(e.to_string()))?;

    wire.item
        .and_then(|item| item.value)
        .map(|content| DeidentifyResponse { content })
        .ok_or(RedactError::MissingContent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_parent() {
        let client =
            HttpDeidentifyClient::new(format!("{}/", DEFAULT_ENDPOINT), None, Duration::from_secs(5))
                .unwrap();

        assert_eq!(
            client.url_for("projects/acme"),
            "https://dlp.googleapis.com/v2/projects/acme/content:deidentify"
        );
    }

    #[test]
    fn test_parse_response() {
        let body = br#"{"item":{"value":"SSN [REDACTED] ok"},"overview":{"transformedBytes":"11"}}"#;
        assert_eq!(parse_response(body).unwrap().content, "SSN [REDACTED] ok");
    }

    #[test]
    fn test_parse_response_without_item() {
        assert!(matches!(
            parse_response(br#"{"overview":{}}"#),
            Err(RedactError::MissingContent)
        ));
        assert!(matches!(
            parse_response(b"not json"),
            Err(RedactError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let client =
            HttpDeidentifyClient::new(DEFAULT_ENDPOINT, Some(String::new()), Duration::from_secs(5))
                .unwrap();
        assert!(client.access_token.is_none());
    }
}

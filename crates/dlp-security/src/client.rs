//! De-identify service contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Template identifiers resolved once at run start and shared by every worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionSettings {
    /// `projects/<project>`
    pub parent: String,
    pub deidentify_template: String,
    pub inspect_template: String,
}

impl RedactionSettings {
    pub fn new(
        project: &str,
        deidentify_template: impl Into<String>,
        inspect_template: impl Into<String>,
    ) -> Self {
        Self {
            parent: format!("projects/{}", project),
            deidentify_template: deidentify_template.into(),
            inspect_template: inspect_template.into(),
        }
    }

    pub fn request_for(&self, content: impl Into<String>) -> DeidentifyRequest {
        DeidentifyRequest {
            parent: self.parent.clone(),
            deidentify_template_name: self.deidentify_template.clone(),
            inspect_template_name: self.inspect_template.clone(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeidentifyRequest {
    pub parent: String,
    pub deidentify_template_name: String,
    pub inspect_template_name: String,
    pub content: String,
}

impl DeidentifyRequest {
    /// JSON body of `POST /v2/{parent}/content:deidentify`
    pub fn body(&self) -> DeidentifyBody<'_> {
        DeidentifyBody {
            deidentify_template_name: &self.deidentify_template_name,
            inspect_template_name: &self.inspect_template_name,
            item: ContentItem {
                value: &self.content,
            },
        }
    }

    /// Size in bytes of the serialized outbound request
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.body()).map_or(self.content.len(), |body| body.len())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeidentifyBody<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    deidentify_template_name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    inspect_template_name: &'a str,
    item: ContentItem<'a>,
}

#[derive(Debug, Serialize)]
struct ContentItem<'a> {
    value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeidentifyResponse {
    pub content: String,
}

/// Capability: submit text with template identifiers, get redacted text back
#[async_trait]
pub trait DeidentifyClient: Send + Sync {
    async fn deidentify(&self, request: &DeidentifyRequest) -> Result<DeidentifyResponse>;
}

//! Per-chunk redaction with bounded retry

use std::sync::Arc;
use std::time::Duration;

use dlp_core::retry::retry;
use dlp_core::{Chunk, PipelineEvent, RedactedChunk, RetryConfig, RetryOutcome, SharedEventSink};

use crate::client::{DeidentifyClient, RedactionSettings};
use crate::{RedactError, Result};

/// Sends each chunk through a [`DeidentifyClient`]
///
/// A chunk either comes back fully redacted or not at all; on failure the
/// original text is dropped with the chunk.
pub struct Redactor {
    client: Arc<dyn DeidentifyClient>,
    settings: Arc<RedactionSettings>,
    retry: RetryConfig,
    timeout: Duration,
    events: SharedEventSink,
}

impl Redactor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(
        client: Arc<dyn DeidentifyClient>,
        settings: RedactionSettings,
        events: SharedEventSink,
    ) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            retry: RetryConfig::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            events,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn settings(&self) -> &RedactionSettings {
        &self.settings
    }

    pub async fn redact(&self, chunk: Chunk) -> Result<RedactedChunk> {
        let request = self.settings.request_for(chunk.text.as_str());
        let request_bytes = request.encoded_len();

        let outcome = retry(&self.retry, |_attempt| {
            let request = &request;
            async move {
                match tokio::time::timeout(self.timeout, self.client.deidentify(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(RedactError::Timeout(self.timeout)),
                }
            }
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                self.events.record(PipelineEvent::ChunkRedacted {
                    filename: chunk.filename.clone(),
                    sequence: chunk.sequence,
                    request_bytes,
                    attempts,
                });
                Ok(chunk.into_redacted(value.content))
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                self.events.record(PipelineEvent::RedactionFailed {
                    filename: chunk.filename,
                    sequence: chunk.sequence,
                    attempts,
                    reason: last_error.to_string(),
                });
                Err(last_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DeidentifyRequest, DeidentifyResponse};
    use async_trait::async_trait;
    use dlp_core::MemoryEventSink;
    use std::sync::Mutex;

    /// Client replaying scripted results, then echoing the request upper-cased
    struct ScriptedClient {
        script: Mutex<Vec<Result<String>>>,
        requests: Mutex<Vec<DeidentifyRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<String>>) -> Self {
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeidentifyClient for ScriptedClient {
        async fn deidentify(&self, request: &DeidentifyRequest) -> Result<DeidentifyResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Ok(request.content.to_uppercase())
                } else {
                    script.remove(0)
                }
            };
            next.map(|content| DeidentifyResponse { content })
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    fn redactor(client: Arc<ScriptedClient>, events: Arc<MemoryEventSink>) -> Redactor {
        Redactor::new(
            client,
            RedactionSettings::new("acme", "deid", "inspect"),
            events,
        )
        .with_retry(fast_retry(3))
    }

    fn unavailable() -> RedactError {
        RedactError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_redact_keeps_key_and_reports_request_size() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("SSN [REDACTED] ok".to_string())]));
        let events = Arc::new(MemoryEventSink::new());
        let redactor = redactor(client.clone(), events.clone());

        let chunk = Chunk::new("a.txt", 0, "SSN 123-45-6789 ok");
        let read_at = chunk.read_at;
        let redacted = redactor.redact(chunk).await.unwrap();

        assert_eq!(redacted.filename, "a.txt");
        assert_eq!(redacted.text, "SSN [REDACTED] ok");
        assert_eq!(redacted.read_at, read_at);

        let request = client.requests.lock().unwrap()[0].clone();
        assert_eq!(request.parent, "projects/acme");
        assert_eq!(request.deidentify_template_name, "deid");
        assert_eq!(request.inspect_template_name, "inspect");

        let expected_bytes = request.encoded_len();
        assert_eq!(
            events.events(),
            vec![PipelineEvent::ChunkRedacted {
                filename: "a.txt".to_string(),
                sequence: 0,
                request_bytes: expected_bytes,
                attempts: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(unavailable()),
            Err(unavailable()),
            Ok("done".to_string()),
        ]));
        let events = Arc::new(MemoryEventSink::new());

        let redacted = redactor(client.clone(), events.clone())
            .redact(Chunk::new("a.txt", 3, "x"))
            .await
            .unwrap();

        assert_eq!(redacted.text, "done");
        assert_eq!(client.calls(), 3);
        assert_eq!(
            events.count(|e| matches!(e, PipelineEvent::ChunkRedacted { attempts: 3, .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried_and_drops_text() {
        let client = Arc::new(ScriptedClient::new(vec![Err(RedactError::Status {
            status: 400,
            body: "invalid template".to_string(),
        })]));
        let events = Arc::new(MemoryEventSink::new());

        let err = redactor(client.clone(), events.clone())
            .redact(Chunk::new("b.txt", 0, "secret 123-45-6789"))
            .await
            .unwrap_err();

        assert!(matches!(err, RedactError::Status { status: 400, .. }));
        assert_eq!(client.calls(), 1);

        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        match &recorded[0] {
            PipelineEvent::RedactionFailed {
                filename, attempts, ..
            } => {
                assert_eq!(filename, "b.txt");
                assert_eq!(*attempts, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(unavailable()),
            Err(unavailable()),
            Err(unavailable()),
            Ok("too late".to_string()),
        ]));
        let events = Arc::new(MemoryEventSink::new());

        assert!(
            redactor(client.clone(), events.clone())
                .redact(Chunk::new("b.txt", 0, "x"))
                .await
                .is_err()
        );
        assert_eq!(client.calls(), 3);
        assert_eq!(
            events.count(|e| matches!(e, PipelineEvent::RedactionFailed { attempts: 3, .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_time_out() {
        let mut client = ScriptedClient::new(Vec::new());
        client.delay = Some(Duration::from_secs(120));
        let client = Arc::new(client);
        let events = Arc::new(MemoryEventSink::new());

        let err = redactor(client.clone(), events)
            .with_retry(fast_retry(2))
            .with_timeout(Duration::from_secs(1))
            .redact(Chunk::new("a.txt", 0, "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, RedactError::Timeout(_)));
        assert_eq!(client.calls(), 2);
    }
}

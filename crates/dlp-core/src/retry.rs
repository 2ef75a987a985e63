//! Bounded retry with exponential backoff for remote calls

use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// The closure receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryOutcome<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt,
                };
            }
            Err(e) => {
                if !e.is_retryable() || attempt >= max_attempts {
                    return RetryOutcome::Exhausted {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                let backoff = config.backoff_for(attempt);
                tracing::debug!(attempt, ?backoff, error = %e, "Retrying after failure");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

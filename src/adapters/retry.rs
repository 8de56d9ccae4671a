use crate::config::TransportConfig;
use crate::domain::model::{Deadline, RawResponse};
use crate::utils::error::{TransportError, TransportErrorKind};
use std::future::Future;
use std::time::Duration;

/// Bounded retry with exponential backoff, shared by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `attempt` until it yields a non-5xx response, fails with a
    /// non-retryable kind, the attempts run out or the deadline passes.
    /// Each attempt receives the time budget it is held to.
    pub async fn execute<F, Fut>(
        &self,
        url: &str,
        deadline: Deadline,
        mut attempt: F,
    ) -> Result<RawResponse, TransportError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<RawResponse, TransportErrorKind>>,
    {
        let mut attempts = 0;

        loop {
            let Some(remaining) = deadline.remaining() else {
                return Err(TransportError::new(
                    url,
                    attempts,
                    TransportErrorKind::DeadlineExceeded,
                ));
            };
            attempts += 1;

            let budget = self.attempt_timeout.min(remaining);
            let clipped = budget < self.attempt_timeout;

            let outcome = match tokio::time::timeout(budget, attempt(budget)).await {
                Ok(outcome) => outcome,
                Err(_) if clipped => Err(TransportErrorKind::DeadlineExceeded),
                Err(_) => Err(TransportErrorKind::Timeout),
            };

            let kind = match outcome {
                Ok(response) if response.status >= 500 => {
                    TransportErrorKind::Status(response.status)
                }
                Ok(response) => {
                    if attempts > 1 {
                        tracing::info!("{} succeeded on attempt {}", url, attempts);
                    }
                    return Ok(response);
                }
                Err(kind) => kind,
            };

            if !kind.is_retryable() || attempts >= self.max_attempts {
                tracing::error!("Giving up on {} after {} attempt(s): {}", url, attempts, kind);
                return Err(TransportError::new(url, attempts, kind));
            }

            let delay = self.backoff_after(attempts);
            if deadline.remaining().map_or(true, |left| left <= delay) {
                tracing::warn!("No time left to retry {} after: {}", url, kind);
                return Err(TransportError::new(
                    url,
                    attempts,
                    TransportErrorKind::DeadlineExceeded,
                ));
            }

            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempts,
                self.max_attempts,
                url,
                kind,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

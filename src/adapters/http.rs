use crate::adapters::retry::RetryPolicy;
use crate::config::TransportConfig;
use crate::domain::model::{FetchRequest, RawResponse};
use crate::domain::ports::Transport;
use crate::utils::error::{AppError, Result, TransportError, TransportErrorKind};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Direct protocol fetch over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.attempt_timeout())
            .build()
            .map_err(|e| AppError::ConfigError {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self::with_client(client, RetryPolicy::from_config(config)))
    }

    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    async fn attempt(
        &self,
        url: &str,
        budget: Duration,
    ) -> std::result::Result<RawResponse, TransportErrorKind> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(budget)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        tracing::debug!("{} answered {} ({:?})", url, status, content_type);

        let body = response
            .bytes()
            .await
            .map_err(|e| match classify_error(e) {
                TransportErrorKind::Timeout => TransportErrorKind::Timeout,
                other => TransportErrorKind::Body(other.to_string()),
            })?;

        Ok(RawResponse::new(status, content_type, body.to_vec()))
    }
}

fn classify_error(error: reqwest::Error) -> TransportErrorKind {
    if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_builder() {
        TransportErrorKind::InvalidUrl(error.to_string())
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body(error.to_string())
    } else {
        TransportErrorKind::Connect(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let url = request.url.as_str();
        self.retry
            .execute(url, request.deadline, |budget| self.attempt(url, budget))
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Deadline;
    use httpmock::prelude::*;

    fn transport(max_attempts: u32, attempt_timeout: Duration) -> HttpTransport {
        HttpTransport::with_client(
            Client::new(),
            RetryPolicy {
                max_attempts,
                attempt_timeout,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(20),
            },
        )
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_content_type() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/catastro/parcela/");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"pdamatriz": "123456"}));
        });

        let response = transport(3, Duration::from_secs(5))
            .fetch(&FetchRequest::new(
                server.url("/catastro/parcela/"),
                Deadline::unbounded(),
            ))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            response.json(),
            Some(serde_json::json!({"pdamatriz": "123456"}))
        );
    }

    #[tokio::test]
    async fn test_payment_required_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/deuda.pdf");
            then.status(402).body("Payment Required");
        });

        let response = transport(5, Duration::from_secs(5))
            .fetch(&FetchRequest::new(server.url("/deuda.pdf"), Deadline::unbounded()))
            .await
            .unwrap();

        assert_eq!(response.status, 402);
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let err = transport(3, Duration::from_secs(5))
            .fetch(&FetchRequest::new(server.url("/flaky"), Deadline::unbounded()))
            .await
            .unwrap_err();

        mock.assert_hits(3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.kind, TransportErrorKind::Status(503));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let err = transport(2, Duration::from_millis(100))
            .fetch(&FetchRequest::new(server.url("/slow"), Deadline::unbounded()))
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::Timeout);
        assert_eq!(err.attempts, 2);
        mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_connect_error() {
        // Port 9 (discard) is closed on CI hosts.
        let err = transport(1, Duration::from_secs(2))
            .fetch(&FetchRequest::new(
                "http://127.0.0.1:9/catastro",
                Deadline::unbounded(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err.kind, TransportErrorKind::Connect(_)));
    }
}

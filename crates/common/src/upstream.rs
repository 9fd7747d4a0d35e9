//! JSON-over-HTTP client for the external model services
//!
//! Both the NER tagger and the relevance scorer are reached as plain JSON
//! POST endpoints. Transient failures (connection errors, timeouts, 5xx,
//! 429) are retried with exponential backoff; anything else fails at once.

use crate::errors::{AppError, Result};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Base delay for exponential backoff
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// A failed upstream call
#[derive(Debug)]
enum UpstreamFailure {
    Status { code: u16, body: String },
    Request(reqwest::Error),
}

impl UpstreamFailure {
    fn is_transient(&self) -> bool {
        match self {
            UpstreamFailure::Status { code, .. } => *code == 429 || *code >= 500,
            UpstreamFailure::Request(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamFailure::Status { code, body } => write!(f, "status {}: {}", code, body),
            UpstreamFailure::Request(e) => write!(f, "{}", e),
        }
    }
}

impl From<UpstreamFailure> for AppError {
    fn from(failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::Request(e) => AppError::HttpClient(e),
            status => AppError::Internal {
                message: format!("upstream returned {}", status),
            },
        }
    }
}

/// POSTs JSON bodies to one endpoint
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
}

impl JsonClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `body` and decode the JSON response, retrying transient failures
    /// up to `max_retries` times
    pub async fn post<Req, Resp>(&self, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(INITIAL_BACKOFF)
            .with_max_elapsed_time(Some(self.timeout * (self.max_retries + 1)))
            .build();

        let mut attempt = 0u32;
        let result = retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                self.send(body).await.map_err(|failure| {
                    if failure.is_transient() && current <= self.max_retries {
                        warn!(
                            endpoint = %self.endpoint,
                            attempt = current,
                            max_retries = self.max_retries,
                            error = %failure,
                            "Upstream request failed, retrying"
                        );
                        backoff::Error::transient(failure)
                    } else {
                        backoff::Error::permanent(failure)
                    }
                })
            }
        })
        .await;

        result.map_err(AppError::from)
    }

    async fn send<Req, Resp>(&self, body: &Req) -> std::result::Result<Resp, UpstreamFailure>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(UpstreamFailure::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamFailure::Status {
                code: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(UpstreamFailure::Request)
    }
}

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub const USER_AGENT: &str = concat!("crashwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("name resolution failed: {0}")]
    Dns(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Transient failures are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(status) => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            FetchError::Timeout(_) | FetchError::Connection(_) => true,
            FetchError::Dns(_) | FetchError::InvalidUrl(_) | FetchError::Other(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    Exhausted { attempts: u32, last_error: FetchError },
    Terminal { attempts: u32, error: FetchError },
}

/// One HTTP GET. Implementations report transport-level problems as
/// [`FetchError`] and hand back any status code they received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| FetchError::Other(format!("build http client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|err| classify(err, timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| classify(err, timeout))?;
        Ok(HttpResponse { status, body })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout(timeout);
    }
    if err.is_builder() {
        return FetchError::InvalidUrl(err.to_string());
    }

    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }

    if err.is_connect() {
        let lowered = detail.to_ascii_lowercase();
        if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
            return FetchError::Dns(detail);
        }
        return FetchError::Connection(detail);
    }
    if err.is_request() || err.is_body() {
        return FetchError::Connection(detail);
    }
    FetchError::Other(detail)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(3),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failed attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.attempt_timeout;
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(timeout, self.transport.get(url, timeout)).await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            };

            let error = match result {
                Ok(response) if (200..300).contains(&response.status) => {
                    tracing::debug!(url = %url, attempt = attempt, "fetched");
                    return FetchOutcome::Success(response.body);
                }
                Ok(response) => FetchError::Status(response.status),
                Err(err) => err,
            };

            if !error.is_retryable() {
                tracing::debug!(url = %url, attempt = attempt, error = %error, "terminal fetch failure");
                return FetchOutcome::Terminal { attempts: attempt, error };
            }
            if attempt >= attempts {
                tracing::warn!(url = %url, attempts = attempts, error = %error, "retries exhausted");
                return FetchOutcome::Exhausted {
                    attempts,
                    last_error: error,
                };
            }

            let delay = self.policy.backoff_delay(attempt);
            tracing::info!(
                url = %url,
                attempt = attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "fetch failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

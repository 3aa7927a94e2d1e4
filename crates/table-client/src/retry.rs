//! Retry-on-transport-failure HTTP fetch.
//!
//! A request is retried with exponential backoff only when it fails below
//! HTTP (connect, reset, timeout). Any response status, including 4xx and
//! 5xx, is a definitive answer and is returned to the caller unchanged.

use std::cmp;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use reqwest::{Client, StatusCode, Url};
use tablemap_common::{TableError, TableResult};
use tracing::{debug, warn};

use crate::config::ClientConfig;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (doubles each retry)
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts (for tests).
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// `op` receives the zero-based attempt number. Only errors for which
/// [`TableError::is_transient`] holds are retried; the last error is
/// returned once the policy is exhausted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> TableResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = TableResult<T>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                counter!("tablemap_fetch_retries_total").increment(1);
                warn!(
                    error = %e,
                    retry = attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP GET with bearer auth and transport-level retry.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    token: Option<String>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(config: &ClientConfig) -> TableResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TableError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: config.token.clone(),
            policy: config.retry,
        })
    }

    /// GET `url` and read the whole body as text.
    ///
    /// Returns the status alongside the body; a non-success status is not an
    /// error here.
    pub async fn get_text(&self, url: &Url) -> TableResult<(StatusCode, String)> {
        retry(&self.policy, |attempt| async move {
            debug!(url = %url, attempt = attempt, "GET");

            let mut request = self.client.get(url.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            let body = response.text().await.map_err(transport_error)?;
            Ok((status, body))
        })
        .await
    }
}

fn transport_error(err: reqwest::Error) -> TableError {
    if err.is_timeout() {
        TableError::Timeout
    } else {
        TableError::Network(err.to_string())
    }
}

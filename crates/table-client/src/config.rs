//! Client configuration.

use std::env;
use std::time::Duration;

use tablemap_common::{TableError, TableResult};

use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://redivis.com/api/v1";

/// Rows requested per page; a full page means another page may follow.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Configuration for the table API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `https://redivis.com/api/v1`
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// `maxResults` per rows request
    pub page_size: usize,
    pub retry: RetryPolicy,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `TABLE_API_URL`, `TABLE_API_TOKEN`,
    /// `TABLE_API_MAX_RETRIES` and `TABLE_API_TIMEOUT_SECS`.
    pub fn from_env() -> TableResult<Self> {
        let mut config = Self::default();

        if let Some(url) = non_empty_var("TABLE_API_URL") {
            config.base_url = url;
        }
        config.token = non_empty_var("TABLE_API_TOKEN");

        if let Some(value) = non_empty_var("TABLE_API_MAX_RETRIES") {
            config.retry.max_retries = value.parse().map_err(|_| {
                TableError::Config(format!("TABLE_API_MAX_RETRIES must be an integer, got '{}'", value))
            })?;
        }
        if let Some(value) = non_empty_var("TABLE_API_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| {
                TableError::Config(format!("TABLE_API_TIMEOUT_SECS must be an integer, got '{}'", value))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.page_size, 10_000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_base_url("http://localhost:9/api/v1")
            .with_token("secret")
            .with_page_size(2);
        assert_eq!(config.base_url, "http://localhost:9/api/v1");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.page_size, 2);
    }
}

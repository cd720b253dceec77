//! Request client configuration types.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffStrategy;
use crate::error::ConfigError;

/// Default number of retries for idempotent calls.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default fixed delay between retries, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

/// Retry policy for `get` calls. Delays are fixed; they do not grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
        }
    }

    /// Create a policy with fixed delay retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay_ms: delay.as_millis() as u64,
        }
    }

    /// The strategy described by this policy.
    pub fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Fixed(Duration::from_millis(self.retry_delay_ms))
    }

    /// Check if another retry attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Get the delay for the next retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff().delay_for_attempt(attempt)
    }
}

/// Request client configuration.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Base URL of the backend (`http://` or `https://`).
    pub base_url: String,
    /// Timeout applied to every request, including reading the body.
    pub timeout: Duration,
    /// Retry policy for `get` calls.
    pub retry_policy: RetryPolicy,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl RequestConfig {
    /// Create a configuration for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// The parsed base URL, normalized to end with `/` so paths join below it.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ConfigError::invalid_url(&self.base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid_url(
                &self.base_url,
                format!("unsupported scheme {:?}, expected http or https", url.scheme()),
            ));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Check the URL and the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.url()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid_policy("request timeout must be > 0"));
        }
        Ok(())
    }
}

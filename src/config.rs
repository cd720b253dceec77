//! Top-level client configuration.

use crate::connection::{ConnectionManager, DEFAULT_STREAM_URL, ReconnectPolicy, StreamConfig};
use crate::error::ConfigError;
use crate::request::{DEFAULT_API_URL, RequestClient, RequestConfig, RetryPolicy};

/// Environment variable overriding the request endpoint base URL.
pub const ENV_API_URL: &str = "TELEMETRY_API_URL";
/// Environment variable overriding the stream endpoint base URL.
pub const ENV_WS_URL: &str = "TELEMETRY_WS_URL";

/// Configuration for both halves of the client.
///
/// The stream and the request endpoints are configured separately; they
/// usually point at the same backend under different schemes.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Stream connection settings.
    pub stream: StreamConfig,
    /// Request client settings.
    pub request: RequestConfig,
}

impl ClientConfig {
    /// Create a configuration with the given base URLs and default policies.
    pub fn new(stream_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            stream: StreamConfig::new(stream_url),
            request: RequestConfig::new(api_url),
        }
    }

    /// Read base URLs from `TELEMETRY_WS_URL` and `TELEMETRY_API_URL`,
    /// falling back to the local defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self::new(
            read(ENV_WS_URL, DEFAULT_STREAM_URL),
            read(ENV_API_URL, DEFAULT_API_URL),
        )
    }

    /// Set the stream reconnect policy.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.stream.reconnect = policy;
        self
    }

    /// Set the request retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.request.retry_policy = policy;
        self
    }

    /// Check both halves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.request.validate()
    }

    /// Construct a connection manager and a request client.
    pub fn build(self) -> Result<(ConnectionManager, RequestClient), ConfigError> {
        self.validate()?;
        let manager = ConnectionManager::new(self.stream)?;
        let client = RequestClient::new(self.request)?;
        Ok((manager, client))
    }
}

//! Stream connection configuration types.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::backoff::{self, BackoffStrategy};
use crate::error::ConfigError;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default delay before the first reconnect, in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
/// Default upper bound on the reconnect delay, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default growth factor between reconnect delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default stream base URL.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8000";
/// Path of the telemetry stream below the base URL.
pub const TELEMETRY_PATH: &str = "/ws/telemetry";

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_backoff_multiplier() -> f64 {
    DEFAULT_BACKOFF_MULTIPLIER
}

/// Reconnect policy for a streaming connection.
///
/// Immutable once handed to a [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Maximum number of reconnects scheduled before the manager gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first reconnect, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on any reconnect delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Random spread applied to each delay, `0.0` for none.
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy that never reconnects.
    pub fn no_reconnect() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Set the maximum number of reconnect attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the first reconnect.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the upper bound on reconnect delays.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the growth factor between delays.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Spread each delay randomly by up to `factor` in either direction.
    ///
    /// Observable delays then no longer follow the plain exponential formula.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Delay before the first reconnect.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Upper bound on reconnect delays.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// The exponential strategy described by this policy, without jitter.
    pub fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Exponential {
            base: self.initial_delay(),
            max: self.max_delay(),
            multiplier: self.backoff_multiplier,
        }
    }

    /// Check if another reconnect may be scheduled after `attempt` reconnects.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Get the delay for the given reconnect attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff::reconnect_delay(attempt, self)
    }

    /// Check that all fields are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::invalid_policy("initialDelayMs must be > 0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::invalid_policy(
                "maxDelayMs must be >= initialDelayMs",
            ));
        }
        if !(self.backoff_multiplier > 1.0) || !self.backoff_multiplier.is_finite() {
            return Err(ConfigError::invalid_policy(
                "backoffMultiplier must be a finite number > 1",
            ));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::invalid_policy("jitterFactor must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Streaming connection configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base URL of the streaming endpoint (`ws://` or `wss://`).
    pub base_url: String,
    /// Path appended to the base URL.
    pub path: String,
    /// Reconnect policy.
    pub reconnect: ReconnectPolicy,
    /// Bound on the opening handshake.
    pub connect_timeout: Duration,
    /// Bound on the closing handshake after `disconnect()`.
    pub close_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STREAM_URL.to_string(),
            path: TELEMETRY_PATH.to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl StreamConfig {
    /// Create a configuration for the telemetry stream below `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the path appended to the base URL.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the opening handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the closing handshake timeout.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// The full stream URL.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let raw = join_path(&self.base_url, &self.path);
        let url = Url::parse(&raw).map_err(|e| ConfigError::invalid_url(&raw, e))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::invalid_url(
                raw.as_str(),
                format!("unsupported scheme {other:?}, expected ws or wss"),
            )),
        }
    }

    /// Check the URL and the reconnect policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.url()?;
        self.reconnect.validate()
    }
}

fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(30));
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_should_retry() {
        let policy = ReconnectPolicy::default().with_max_attempts(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!ReconnectPolicy::no_reconnect().should_retry(0));
    }

    #[test]
    fn test_policy_validation() {
        let zero = ReconnectPolicy::default().with_initial_delay(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidPolicy(_))));

        let inverted = ReconnectPolicy::default()
            .with_initial_delay(Duration::from_secs(5))
            .with_max_delay(Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        assert!(ReconnectPolicy::default().with_multiplier(1.0).validate().is_err());
        assert!(ReconnectPolicy::default().with_multiplier(f64::NAN).validate().is_err());
        assert!(ReconnectPolicy::default().with_jitter(1.0).validate().is_err());
        assert!(ReconnectPolicy::no_reconnect().validate().is_ok());
    }

    #[test]
    fn test_policy_from_json() {
        let policy: ReconnectPolicy =
            serde_json::from_str(r#"{"maxAttempts":3,"initialDelayMs":500}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 500);
        assert_eq!(policy.max_delay_ms, DEFAULT_MAX_DELAY_MS);
        assert_eq!(policy.jitter_factor, 0.0);
    }

    #[test]
    fn test_stream_url() {
        let config = StreamConfig::new("ws://localhost:8000/");
        assert_eq!(
            config.url().unwrap().as_str(),
            "ws://localhost:8000/ws/telemetry"
        );

        let config = StreamConfig::new("wss://example.com").with_path("live");
        assert_eq!(config.url().unwrap().as_str(), "wss://example.com/live");

        assert!(matches!(
            StreamConfig::new("http://localhost:8000").validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(StreamConfig::new("not a url").validate().is_err());
    }
}

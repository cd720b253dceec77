//! Delay computation for reconnects and retries.

use std::time::Duration;

use rand::Rng;

use crate::connection::ReconnectPolicy;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between attempts.
    Fixed(Duration),
    /// Exponential backoff with configurable parameters.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier for each attempt.
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(d) => *d,
            BackoffStrategy::Exponential {
                base,
                max,
                multiplier,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay_ms = base.as_millis() as f64 * multiplier.powi(exponent);
                Duration::from_millis(delay_ms.min(max.as_millis() as f64) as u64)
            }
        }
    }
}

/// Reconnect delay before attempt `attempt` (0-indexed at the first retry).
///
/// Without jitter this is exactly
/// `min(initial_delay_ms * backoff_multiplier^attempt, max_delay_ms)`.
pub fn reconnect_delay(attempt: u32, policy: &ReconnectPolicy) -> Duration {
    let delay = policy.backoff().delay_for_attempt(attempt);
    if policy.jitter_factor <= 0.0 {
        return delay;
    }
    apply_jitter(delay, policy.jitter_factor, policy.max_delay())
}

/// Scale `delay` by a random factor in `[1 - factor, 1 + factor]`, capped at `max`.
fn apply_jitter(delay: Duration, factor: f64, max: Duration) -> Duration {
    let scale = rand::thread_rng().gen_range(1.0 - factor..=1.0 + factor);
    let jittered = Duration::from_millis((delay.as_millis() as f64 * scale) as u64);
    jittered.min(max)
}

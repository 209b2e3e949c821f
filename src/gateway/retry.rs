//! Retry policy for generation requests

use std::time::Duration;

use crate::config::RetryConfig;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Latency recorded when every attempt failed
    pub failure_latency: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): base doubled per retry, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn failure_latency_ms(&self) -> f64 {
        self.failure_latency.as_secs_f64() * 1000.0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            failure_latency: Duration::from_millis(config.failure_latency_ms),
        }
    }
}

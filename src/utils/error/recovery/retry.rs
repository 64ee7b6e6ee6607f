//! Exponential backoff for retry rounds

use crate::config::RetryConfig;
use std::time::Duration;

/// Exponential backoff with an upper bound and optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a new backoff schedule
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64, jitter: bool) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier: multiplier.max(1.0),
            jitter,
        }
    }

    /// Build the schedule described by a retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.base_delay(),
            config.max_delay(),
            config.backoff_multiplier,
            config.jitter,
        )
    }

    /// Delay before retry round `round` (1-based), without jitter
    pub fn nominal_delay(&self, round: u32) -> Duration {
        let exponent = round.saturating_sub(1).min(63) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry round `round`, with ±5% jitter when enabled
    pub fn delay(&self, round: u32) -> Duration {
        let delay = self.nominal_delay(round);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let jitter_factor = 0.1;
        let jitter = delay.as_millis() as f64 * jitter_factor * (rand::random::<f64>() - 0.5);
        let jittered = (delay.as_millis() as f64 + jitter).max(0.0) as u64;
        Duration::from_millis(jittered).min(self.max_delay)
    }
}

//! Dispatch throttling configuration

use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dispatch throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Batch requests per minute
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    /// Store-reported vector queue depth above which dispatch pauses
    #[serde(default)]
    pub max_queue_depth: Option<u64>,
    /// How often shard status is polled, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: None,
            max_queue_depth: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = Some(rpm);
        self
    }

    pub fn with_max_queue_depth(mut self, depth: u64) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Whether any throttling is configured
    pub fn is_enabled(&self) -> bool {
        self.requests_per_minute.is_some() || self.max_queue_depth.is_some()
    }
}

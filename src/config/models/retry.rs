//! Retry configuration

use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to items the store rejects with a retryable error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Record the failure and hand it to the outcome callback
    ReportOnly,
    /// Re-enqueue with backoff until the retry budget runs out
    #[default]
    RetryFailed,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub mode: FailureMode,
    /// Maximum resubmissions after an item-level error
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Maximum reconciliation rounds after timeouts or connection failures
    #[serde(default = "default_timeout_retries")]
    pub timeout_retries: u32,
    /// Base delay between retry rounds, in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Maximum delay between retry rounds, in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            mode: FailureMode::default(),
            max_retries: default_max_retries(),
            timeout_retries: default_timeout_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Create a new config
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_retries(mut self, timeout_retries: u32) -> Self {
        self.timeout_retries = timeout_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn retries_enabled(&self) -> bool {
        self.mode == FailureMode::RetryFailed
    }
}

//! Batch assembly and dispatch configuration

use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How batch sizes are chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BatchSizing {
    /// Constant batch size
    Fixed { size: usize },
    /// Size adapted to observed request latency
    Dynamic(DynamicSizing),
}

impl Default for BatchSizing {
    fn default() -> Self {
        BatchSizing::Fixed {
            size: default_batch_size(),
        }
    }
}

impl BatchSizing {
    /// Upper bound on any batch this policy can emit
    pub fn max_size(&self) -> usize {
        match self {
            BatchSizing::Fixed { size } => *size,
            BatchSizing::Dynamic(dynamic) => dynamic.max_size,
        }
    }
}

/// Additive-increase / multiplicative-decrease sizing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSizing {
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_batch_size")]
    pub initial_size: usize,
    /// Request duration the controller steers towards
    #[serde(default = "default_target_duration_ms")]
    pub target_duration_ms: u64,
    #[serde(default = "default_increase_step")]
    pub increase_step: usize,
    #[serde(default = "default_decrease_factor")]
    pub decrease_factor: f64,
}

impl Default for DynamicSizing {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            initial_size: default_batch_size(),
            target_duration_ms: default_target_duration_ms(),
            increase_step: default_increase_step(),
            decrease_factor: default_decrease_factor(),
        }
    }
}

impl DynamicSizing {
    pub fn target_duration(&self) -> Duration {
        Duration::from_millis(self.target_duration_ms)
    }
}

fn default_min_size() -> usize {
    10
}

fn default_max_size() -> usize {
    1000
}

fn default_target_duration_ms() -> u64 {
    2000
}

fn default_increase_step() -> usize {
    10
}

fn default_decrease_factor() -> f64 {
    0.5
}

/// Batch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Sizing policy
    #[serde(default)]
    pub sizing: BatchSizing,
    /// Number of concurrent dispatch workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Assembled batches allowed to wait for a worker before the assembler blocks
    #[serde(default = "default_max_in_flight_batches")]
    pub max_in_flight_batches: usize,
    /// Queued items allowed before `add_*` blocks
    #[serde(default)]
    pub max_queue_len: Option<usize>,
    /// Assembler tick; dynamic sizing emits partial batches on each tick
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Upper bound on a flush or close drain
    #[serde(default)]
    pub drain_timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sizing: BatchSizing::default(),
            concurrency: default_concurrency(),
            max_in_flight_batches: default_max_in_flight_batches(),
            max_queue_len: None,
            flush_interval_ms: default_flush_interval_ms(),
            drain_timeout_secs: None,
        }
    }
}

impl BatchConfig {
    /// Create a new config
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.sizing = BatchSizing::Fixed { size };
        self
    }

    /// Use dynamic sizing
    pub fn with_dynamic_sizing(mut self, dynamic: DynamicSizing) -> Self {
        self.sizing = BatchSizing::Dynamic(dynamic);
        self
    }

    /// Set concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the in-flight batch bound
    pub fn with_max_in_flight_batches(mut self, max: usize) -> Self {
        self.max_in_flight_batches = max.max(1);
        self
    }

    /// Bound the item queue
    pub fn with_max_queue_len(mut self, max: usize) -> Self {
        self.max_queue_len = Some(max);
        self
    }

    /// Set the assembler tick
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Bound flush and close
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}

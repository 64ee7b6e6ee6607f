//! Configuration data models
//!
//! This module defines all configuration structures used by the engine.

pub mod batch;
pub mod client;
pub mod logging;
pub mod rate_limit;
pub mod retry;

// Re-export all configuration types
pub use batch::*;
pub use client::*;
pub use logging::*;
pub use rate_limit::*;
pub use retry::*;

/// Default remote store URL
pub fn default_url() -> String {
    "http://localhost:8080".to_string()
}

/// Default request timeout in seconds
pub fn default_timeout() -> u64 {
    30
}

/// Default fixed batch size
pub fn default_batch_size() -> usize {
    100
}

/// Default number of dispatch workers
pub fn default_concurrency() -> usize {
    2
}

/// Default bound on batches waiting for a worker
pub fn default_max_in_flight_batches() -> usize {
    4
}

/// Default assembler tick in milliseconds
pub fn default_flush_interval_ms() -> u64 {
    1000
}

/// Default maximum retry attempts
pub fn default_max_retries() -> u32 {
    3
}

/// Default number of ambiguous-failure reconciliation rounds
pub fn default_timeout_retries() -> u32 {
    3
}

pub fn default_base_delay() -> u64 {
    100
}

pub fn default_max_delay() -> u64 {
    30_000
}

pub fn default_backoff_multiplier() -> f64 {
    2.0
}

pub fn default_jitter() -> bool {
    true
}

pub fn default_poll_interval_ms() -> u64 {
    1000
}

pub fn default_log_level() -> String {
    "info".to_string()
}

//! Utility modules for the batch engine
//!
//! ## Module Organization
//!
//! - **error**: Error types, failure classification and backoff
//! - **logging**: Tracing subscriber setup
//! - **net**: Request-rate limiting

pub mod error;
pub mod logging;
pub mod net;

pub use error::{BatchError, ErrorClass, Result};
pub use net::SlidingWindow;

/// Format duration as human readable string
pub fn format_duration(duration_ms: u64) -> String {
    if duration_ms < 1000 {
        format!("{}ms", duration_ms)
    } else if duration_ms < 60_000 {
        format!("{:.1}s", duration_ms as f64 / 1000.0)
    } else if duration_ms < 3_600_000 {
        format!("{:.1}m", duration_ms as f64 / 60_000.0)
    } else {
        format!("{:.1}h", duration_ms as f64 / 3_600_000.0)
    }
}

/// Truncate string to specified length with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

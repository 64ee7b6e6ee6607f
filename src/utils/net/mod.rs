//! Network utilities
//!
//! This module provides request-rate limiting shared by the dispatch governor.

pub mod limiter;

// Re-export commonly used types
pub use limiter::SlidingWindow;

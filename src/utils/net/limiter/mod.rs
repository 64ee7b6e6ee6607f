//! Rate limiting utilities
//!
//! This module provides request-rate limiting using a sliding window.

mod window;


pub use window::SlidingWindow;

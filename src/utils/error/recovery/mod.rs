//! Error recovery utilities
//!
//! Backoff scheduling shared by the retry coordinator.

mod retry;

pub use retry::ExponentialBackoff;

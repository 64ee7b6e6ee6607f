//! Error Handling utilities
//!
//! This module provides error types, failure classification and recovery helpers.

pub mod error;
pub mod recovery;

// Re-export commonly used types and functions
pub use error::*;
pub use recovery::*;

//! Error handling for the batch engine
//!
//! This module defines all error types used throughout the engine.

mod classify;
mod helpers;
mod types;

pub use classify::{ErrorClass, classify};
pub use types::{BatchError, Result};

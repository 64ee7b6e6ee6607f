//! Configuration validation
//!
//! This module provides validation logic for all configuration structures.
//!
//! - `trait_def`: Core Validate trait definition
//! - `engine_validators`: Validators for client, batch, retry, rate limit and logging settings
//! - `tests`: Test suite for all validators

mod engine_validators;
mod trait_def;

pub use trait_def::Validate;

//! Storage layer for the batch engine
//!
//! This module provides access to the remote store batches are written to.

/// Vector storage module
pub mod vector;

pub use vector::{BatchTransport, RestTransport, StreamTransport};

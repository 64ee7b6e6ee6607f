//! Core functionality for the batch engine

pub mod batch;

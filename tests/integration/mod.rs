//! Integration tests for vecbatch-rs
//!
//! These tests run whole sessions against the in-memory store, and the REST
//! transport against a mock HTTP server.

pub mod delivery_tests;
pub mod rest_transport_tests;
pub mod throttle_tests;

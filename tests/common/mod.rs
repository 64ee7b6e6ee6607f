//! Common test utilities for vecbatch-rs
//!
//! - `store`: in-memory store with scriptable per-item and per-call faults
//! - `fixtures`: objects and engine configurations with test-friendly defaults
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::common::{fixtures, store::MockStore};
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let store = Arc::new(MockStore::new());
//!     let client = BatchClient::new(store.clone(), fixtures::config(10, 2)).unwrap();
//!     // ...
//! }
//! ```

pub mod store;

pub use store::{CallFault, ItemCtx, MockStore};

/// Assert that a result is Ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a result is Err and return the error
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}

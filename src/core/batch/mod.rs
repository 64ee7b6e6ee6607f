//! Batch ingestion engine
//!
//! Items added to a [`BatchSession`] flow through the [`ItemQueue`], are
//! grouped by the [`BatchAssembler`], sent by the [`Dispatcher`] worker pool
//! and settled by the [`RetryCoordinator`] into the [`ResultSink`]. The
//! [`RateGovernor`] gates dispatch on a request budget and on the store's
//! indexing backlog.

mod assembler;
mod client;
mod dispatcher;
mod governor;
mod queue;
mod reconcile;
mod results;
mod retry;
mod session;
mod types;


// Re-export all public types
pub use assembler::{BatchAssembler, BatchSizer};
pub use client::BatchClient;
pub use dispatcher::{DispatchHandle, DispatchReport, DispatchStats, Dispatcher};
pub use governor::{RateGovernor, TargetSet, wait_until_drained};
pub use queue::ItemQueue;
pub use reconcile::{ContentMatch, ExistenceOnly, Reconciler, Verdict};
pub use results::{OutcomeCallback, ResultSink};
pub use retry::{Decision, Failure, RetryCoordinator, RetryState};
pub use session::BatchSession;
pub use types::{
    Batch, BatchOutcome, BatchSummary, DispatchOutcome, Envelope, FailedItem, FailedObject,
    FailedReference, Item, ItemError, ItemId, ItemKind, ObjectItem, OutcomeStatus, ReferenceItem,
};

//! Result sink
//!
//! Collects the terminal outcome of every item. The first record for an id
//! wins; later deliveries for the same id are dropped. Counters are updated
//! under the same lock as the record they describe.
//!
//! Outcomes themselves are only buffered for [`ResultSink::pop_all`] when
//! retention is switched on. Otherwise an item's payload is released as soon
//! as the callback has seen it, except for terminal failures, which stay in
//! the failure lists until `clear_failed`.

use super::types::{
    BatchOutcome, BatchSummary, FailedItem, FailedObject, FailedReference, Item, ItemError,
    ItemId, OutcomeStatus,
};
use crate::utils::error::ErrorClass;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::warn;

/// Per-outcome callback
pub type OutcomeCallback = Arc<dyn Fn(&BatchOutcome) + Send + Sync>;

#[derive(Default)]
struct SinkState {
    recorded: HashSet<ItemId>,
    unpopped: Vec<BatchOutcome>,
    failed_objects: Vec<FailedObject>,
    failed_references: Vec<FailedReference>,
}

/// Thread-safe aggregation of terminal outcomes
#[derive(Default)]
pub struct ResultSink {
    state: Mutex<SinkState>,
    successes: AtomicU64,
    /// Failures since creation or the last `clear_failed`
    errors: AtomicU64,
    failed_total: AtomicU64,
    aborted: AtomicU64,
    /// Buffer outcomes for `pop_all`
    retain: AtomicBool,
    callback: RwLock<Option<OutcomeCallback>>,
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("successes", &self.number_successes())
            .field("errors", &self.number_errors())
            .field("aborted", &self.aborted.load(Ordering::SeqCst))
            .finish()
    }
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the per-outcome callback
    pub fn set_callback(&self, callback: OutcomeCallback) {
        *self.callback.write() = Some(callback);
    }

    /// Buffer recorded outcomes until popped; switching off drops the buffer
    pub fn retain_outcomes(&self, retain: bool) {
        let mut state = self.state.lock();
        self.retain.store(retain, Ordering::SeqCst);
        if !retain {
            state.unpopped = Vec::new();
        }
    }

    /// Record a terminal outcome; returns false if the id was already recorded
    pub fn record(&self, outcome: BatchOutcome) -> bool {
        {
            let mut state = self.state.lock();
            if !state.recorded.insert(outcome.id) {
                warn!("Dropping duplicate outcome for item {}", outcome.id);
                return false;
            }

            match &outcome.status {
                OutcomeStatus::Succeeded => {
                    self.successes.fetch_add(1, Ordering::SeqCst);
                }
                OutcomeStatus::Failed {
                    error,
                    class,
                    retries,
                } => {
                    self.errors.fetch_add(1, Ordering::SeqCst);
                    self.failed_total.fetch_add(1, Ordering::SeqCst);
                    match outcome.item.as_ref() {
                        Item::Object(object) => state.failed_objects.push(FailedItem {
                            id: outcome.id,
                            item: object.clone(),
                            error: error.clone(),
                            class: *class,
                            retries: *retries,
                        }),
                        Item::Reference(reference) => state.failed_references.push(FailedItem {
                            id: outcome.id,
                            item: reference.clone(),
                            error: error.clone(),
                            class: *class,
                            retries: *retries,
                        }),
                    }
                }
                OutcomeStatus::Aborted => {
                    self.aborted.fetch_add(1, Ordering::SeqCst);
                }
            }

            if self.retain.load(Ordering::SeqCst) {
                state.unpopped.push(outcome.clone());
            }
        }

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(&outcome);
        }
        true
    }

    /// Forget the ids of items that can no longer be delivered
    pub fn release(&self, ids: &[ItemId]) {
        let mut state = self.state.lock();
        for id in ids {
            state.recorded.remove(id);
        }
        state.recorded.shrink_to_fit();
    }

    /// Take every outcome buffered since the last call; empty unless
    /// retention is on
    pub fn pop_all(&self) -> Vec<BatchOutcome> {
        std::mem::take(&mut self.state.lock().unpopped)
    }

    /// Objects that ended in terminal failure
    pub fn failed_objects(&self) -> Vec<FailedObject> {
        self.state.lock().failed_objects.clone()
    }

    /// References that ended in terminal failure
    pub fn failed_references(&self) -> Vec<FailedReference> {
        self.state.lock().failed_references.clone()
    }

    /// Terminal failure recorded for `id`, if any
    pub fn failure_for(&self, id: ItemId) -> Option<(ItemError, ErrorClass)> {
        let state = self.state.lock();
        let object = state.failed_objects.iter().find(|f| f.id == id);
        match object {
            Some(failed) => Some((failed.error.clone(), failed.class)),
            None => state
                .failed_references
                .iter()
                .find(|f| f.id == id)
                .map(|failed| (failed.error.clone(), failed.class)),
        }
    }

    /// Empty both failure lists and reset the error counter
    pub fn clear_failed(&self) {
        let mut state = self.state.lock();
        state.failed_objects.clear();
        state.failed_references.clear();
        self.errors.store(0, Ordering::SeqCst);
    }

    /// Terminal failures since creation or the last `clear_failed`
    pub fn number_errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn number_successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Whether an outcome was recorded for `id`
    pub fn is_recorded(&self, id: ItemId) -> bool {
        self.state.lock().recorded.contains(&id)
    }

    /// Lifetime totals
    pub fn summary(&self) -> BatchSummary {
        let _state = self.state.lock();
        let succeeded = self.successes.load(Ordering::SeqCst);
        let failed = self.failed_total.load(Ordering::SeqCst);
        let aborted = self.aborted.load(Ordering::SeqCst);
        BatchSummary {
            total: succeeded + failed + aborted,
            succeeded,
            failed,
            aborted,
            ..BatchSummary::default()
        }
    }
}

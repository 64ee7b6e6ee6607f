//! Retry coordinator
//!
//! Owns the per-item retry state of a session. Every decision about an item
//! (succeeded, resubmit, reconcile, give up) goes through here, keyed by
//! correlation id and checked against the item's current generation so that
//! late outcomes of abandoned attempts are dropped.

use super::reconcile::Verdict;
use super::types::{Envelope, Item, ItemError, ItemId};
use crate::config::{FailureMode, RetryConfig};
use crate::utils::error::{ErrorClass, ExponentialBackoff};
use dashmap::DashMap;
use dashmap::mapref::entry::{Entry, OccupiedEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Retry bookkeeping for one live item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Failed attempts caused by item errors
    pub attempts: u32,
    /// Ambiguous (timeout/network) rounds
    pub timeouts: u32,
    /// Resubmissions so far
    pub retries: u32,
    pub generation: u32,
    pub last_error: Option<ItemError>,
    /// Nominal delay before the pending resubmission
    pub next_backoff: Option<Duration>,
}

#[derive(Debug)]
struct Tracked {
    item: Arc<Item>,
    state: RetryState,
}

/// Terminal failure decided by the coordinator
#[derive(Debug, Clone)]
pub struct Failure {
    pub id: ItemId,
    pub item: Arc<Item>,
    pub error: ItemError,
    pub class: ErrorClass,
    pub retries: u32,
}

/// Decision for an item whose attempt ended
#[derive(Debug)]
pub enum Decision {
    /// Outcome belongs to an abandoned attempt or a finished item
    Stale,
    Succeeded(Arc<Item>),
    /// Send again in the given retry round
    Resubmit { envelope: Envelope, round: u32 },
    /// Ask the store what happened before deciding
    Reconcile(Envelope),
    Failed(Failure),
}

/// Per-session retry table
#[derive(Debug)]
pub struct RetryCoordinator {
    table: DashMap<ItemId, Tracked>,
    config: RetryConfig,
    backoff: ExponentialBackoff,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        let backoff = ExponentialBackoff::from_config(&config);
        Self {
            table: DashMap::new(),
            config,
            backoff,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Start tracking a freshly enqueued item
    pub fn register(&self, envelope: &Envelope) {
        self.table.insert(
            envelope.id,
            Tracked {
                item: envelope.item.clone(),
                state: RetryState {
                    generation: envelope.generation,
                    ..RetryState::default()
                },
            },
        );
    }

    /// Stop tracking an item that never entered the queue
    pub fn forget(&self, id: ItemId) -> bool {
        self.table.remove(&id).is_some()
    }

    /// Items not yet terminal
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Snapshot of an item's state
    pub fn state(&self, id: ItemId) -> Option<RetryState> {
        self.table.get(&id).map(|tracked| tracked.state.clone())
    }

    /// Delay before retry round `round`
    pub fn backoff(&self, round: u32) -> Duration {
        self.backoff.delay(round)
    }

    /// The store accepted the item
    pub fn on_success(&self, id: ItemId, generation: u32) -> Decision {
        match self.table.entry(id) {
            Entry::Occupied(entry) if entry.get().state.generation == generation => {
                Decision::Succeeded(entry.remove().item)
            }
            _ => Decision::Stale,
        }
    }

    /// The store rejected the item
    pub fn on_error(&self, id: ItemId, generation: u32, err: ItemError) -> Decision {
        let Entry::Occupied(mut entry) = self.table.entry(id) else {
            return Decision::Stale;
        };
        if entry.get().state.generation != generation {
            return Decision::Stale;
        }

        let class = err.class();
        if class == ErrorClass::Network {
            // The store timed out on this item; it may still have been written
            return self.unresolved(id, entry, err);
        }

        let state = &mut entry.get_mut().state;
        state.attempts += 1;
        state.last_error = Some(err.clone());

        if class.is_terminal() || self.config.mode == FailureMode::ReportOnly {
            let tracked = entry.remove();
            return Decision::Failed(Failure {
                id,
                item: tracked.item,
                error: err,
                class,
                retries: tracked.state.retries,
            });
        }

        if state.attempts > self.config.max_retries {
            let tracked = entry.remove();
            error!(
                "Item {} exhausted {} retries: {}",
                id, tracked.state.retries, err
            );
            return Decision::Failed(Failure {
                id,
                item: tracked.item,
                error: err,
                class: ErrorClass::Exhausted,
                retries: tracked.state.retries,
            });
        }

        let (envelope, round) = self.bump(id, entry.get_mut());
        Decision::Resubmit { envelope, round }
    }

    /// The item's fate is unknown after a timeout or dropped connection
    pub fn on_ambiguous(&self, id: ItemId, generation: u32, message: &str) -> Decision {
        let Entry::Occupied(entry) = self.table.entry(id) else {
            return Decision::Stale;
        };
        if entry.get().state.generation != generation {
            return Decision::Stale;
        }

        let err = ItemError::new(message).with_code("DEADLINE_EXCEEDED");
        self.unresolved(id, entry, err)
    }

    /// Hand the item to reconciliation, or fail it once its ambiguous rounds are used up
    fn unresolved(
        &self,
        id: ItemId,
        mut entry: OccupiedEntry<'_, ItemId, Tracked>,
        err: ItemError,
    ) -> Decision {
        let state = &mut entry.get_mut().state;
        state.timeouts += 1;
        state.last_error = Some(err.clone());

        if state.timeouts > self.config.timeout_retries {
            let tracked = entry.remove();
            error!(
                "Item {} still unresolved after {} ambiguous rounds: {}",
                id, tracked.state.timeouts, err.message
            );
            return Decision::Failed(Failure {
                id,
                item: tracked.item,
                error: err,
                class: ErrorClass::Network,
                retries: tracked.state.retries,
            });
        }

        let tracked = entry.get();
        Decision::Reconcile(Envelope {
            id,
            generation: tracked.state.generation,
            item: tracked.item.clone(),
        })
    }

    /// Apply the reconciliation verdict for an item handed out as [`Decision::Reconcile`]
    pub fn resolve(&self, id: ItemId, generation: u32, verdict: Verdict) -> Decision {
        let Entry::Occupied(mut entry) = self.table.entry(id) else {
            return Decision::Stale;
        };
        if entry.get().state.generation != generation {
            return Decision::Stale;
        }

        if verdict.is_stored() {
            debug!("Item {} already stored, not resubmitting", id);
            return Decision::Succeeded(entry.remove().item);
        }

        if self.config.mode == FailureMode::ReportOnly {
            let tracked = entry.remove();
            let error = tracked
                .state
                .last_error
                .unwrap_or_else(|| ItemError::new(format!("Write outcome {:?}", verdict)));
            return Decision::Failed(Failure {
                id,
                item: tracked.item,
                error,
                class: ErrorClass::Network,
                retries: tracked.state.retries,
            });
        }

        debug!("Item {} reconciled as {:?}, resubmitting", id, verdict);
        let (envelope, round) = self.bump(id, entry.get_mut());
        Decision::Resubmit { envelope, round }
    }

    fn bump(&self, id: ItemId, tracked: &mut Tracked) -> (Envelope, u32) {
        let state = &mut tracked.state;
        state.generation += 1;
        state.retries += 1;
        state.next_backoff = Some(self.backoff.nominal_delay(state.retries));

        (
            Envelope {
                id,
                generation: state.generation,
                item: tracked.item.clone(),
            },
            state.retries,
        )
    }

    /// Remove every live item, for abort
    pub fn drain(&self) -> Vec<(ItemId, Arc<Item>)> {
        let ids: Vec<ItemId> = self.table.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.table.remove(&id))
            .map(|(id, tracked)| (id, tracked.item))
            .collect()
    }
}

//! Batch assembly and sizing

use super::queue::ItemQueue;
use super::types::{Batch, ItemKind};
use crate::config::BatchSizing;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Chooses the size of the next batch.
///
/// Fixed sizing never changes. Dynamic sizing is additive-increase /
/// multiplicative-decrease: a full batch answered cleanly within the target
/// duration grows the size by `increase_step`, an erroring or slow batch
/// shrinks it by `decrease_factor`. The size stays within `[min, max]`.
#[derive(Debug)]
pub struct BatchSizer {
    policy: BatchSizing,
    current: AtomicUsize,
}

impl BatchSizer {
    pub fn new(policy: BatchSizing) -> Self {
        let initial = match &policy {
            BatchSizing::Fixed { size } => *size,
            BatchSizing::Dynamic(dynamic) => dynamic
                .initial_size
                .clamp(dynamic.min_size, dynamic.max_size),
        };
        Self {
            policy,
            current: AtomicUsize::new(initial.max(1)),
        }
    }

    /// Size of the next batch
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Largest batch this sizer can ever ask for
    pub fn max_size(&self) -> usize {
        self.policy.max_size()
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.policy, BatchSizing::Dynamic(_))
    }

    /// Feed back the result of one dispatched batch
    pub fn record(&self, len: usize, elapsed: Duration, had_errors: bool) {
        let BatchSizing::Dynamic(dynamic) = &self.policy else {
            return;
        };

        let current = self.current();
        let next = if had_errors || elapsed > dynamic.target_duration() {
            ((current as f64 * dynamic.decrease_factor).floor() as usize).max(dynamic.min_size)
        } else if len >= current {
            (current + dynamic.increase_step).min(dynamic.max_size)
        } else {
            current
        };

        if next != current {
            debug!(
                "Batch size {} -> {} (len={}, elapsed={:?}, errors={})",
                current, next, len, elapsed, had_errors
            );
            self.current.store(next, Ordering::Relaxed);
        }
    }
}

/// Groups queued items into homogeneous, size-bounded batches
#[derive(Debug)]
pub struct BatchAssembler {
    queue: Arc<ItemQueue>,
    sizer: Arc<BatchSizer>,
    turn: AtomicUsize,
}

impl BatchAssembler {
    pub fn new(queue: Arc<ItemQueue>, sizer: Arc<BatchSizer>) -> Self {
        Self {
            queue,
            sizer,
            turn: AtomicUsize::new(0),
        }
    }

    pub fn sizer(&self) -> &Arc<BatchSizer> {
        &self.sizer
    }

    /// Take the next batch, if one is due.
    ///
    /// A batch is due once a lane holds a full batch, or, with
    /// `force_partial`, as soon as the lane holds anything. Lanes are
    /// visited alternately so neither kind starves.
    pub fn next_batch(&self, force_partial: bool) -> Option<Batch> {
        let size = self.sizer.current();
        let start = self.turn.fetch_add(1, Ordering::Relaxed);

        for offset in 0..ItemKind::ALL.len() {
            let kind = ItemKind::ALL[(start + offset) % ItemKind::ALL.len()];
            let queued = self.queue.lane_len(kind);
            if queued == 0 || (queued < size && !force_partial) {
                continue;
            }

            let entries = self.queue.drain_up_to(kind, size);
            if !entries.is_empty() {
                return Some(Batch::new(kind, entries));
            }
        }

        None
    }
}

//! Item queue
//!
//! Pending writes wait here, one FIFO lane per item kind, until the assembler
//! drains them into batches.

use super::types::{Envelope, ItemId, ItemKind};
use crate::utils::error::{BatchError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Ordered buffer of pending items
#[derive(Debug)]
pub struct ItemQueue {
    objects: Mutex<VecDeque<Envelope>>,
    references: Mutex<VecDeque<Envelope>>,
    /// Items across both lanes
    len: AtomicUsize,
    max_len: Option<usize>,
    ids: Arc<AtomicU64>,
    closed: AtomicBool,
    ready: Notify,
    space: Notify,
}

impl ItemQueue {
    /// Create a queue drawing correlation ids from `ids`
    pub fn new(max_len: Option<usize>, ids: Arc<AtomicU64>) -> Self {
        Self {
            objects: Mutex::new(VecDeque::new()),
            references: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            max_len,
            ids,
            closed: AtomicBool::new(false),
            ready: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Allocate the next correlation id
    pub fn next_id(&self) -> ItemId {
        ItemId(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    fn lane(&self, kind: ItemKind) -> &Mutex<VecDeque<Envelope>> {
        match kind {
            ItemKind::Object => &self.objects,
            ItemKind::Reference => &self.references,
        }
    }

    /// Append a new item, waiting for room when the queue is bounded
    pub async fn enqueue(&self, envelope: Envelope) -> Result<ItemId> {
        let id = envelope.id;
        self.reserve().await?;

        self.lane(envelope.kind()).lock().push_back(envelope);
        self.ready.notify_one();
        Ok(id)
    }

    async fn reserve(&self) -> Result<()> {
        let Some(max_len) = self.max_len else {
            self.ensure_open()?;
            self.len.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        };

        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            let current = self.len.load(Ordering::SeqCst);
            if current < max_len {
                if self
                    .len
                    .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }

            notified.await;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BatchError::session_closed("Queue no longer accepts items"))
        } else {
            Ok(())
        }
    }

    /// Put retried items back; never blocks and ignores the bound
    pub fn requeue(&self, envelopes: Vec<Envelope>) {
        if envelopes.is_empty() {
            return;
        }

        let count = envelopes.len();
        for envelope in envelopes {
            self.lane(envelope.kind()).lock().push_back(envelope);
        }
        self.len.fetch_add(count, Ordering::SeqCst);
        self.ready.notify_one();
    }

    /// Remove up to `n` items of one kind, oldest first
    pub fn drain_up_to(&self, kind: ItemKind, n: usize) -> Vec<Envelope> {
        let taken: Vec<Envelope> = {
            let mut lane = self.lane(kind).lock();
            let count = n.min(lane.len());
            lane.drain(..count).collect()
        };

        if !taken.is_empty() {
            self.len.fetch_sub(taken.len(), Ordering::SeqCst);
            self.space.notify_waiters();
        }
        taken
    }

    /// Empty both lanes
    pub fn drain_all(&self) -> Vec<Envelope> {
        let mut all = self.drain_up_to(ItemKind::Object, usize::MAX);
        all.extend(self.drain_up_to(ItemKind::Reference, usize::MAX));
        all
    }

    /// Queued items of one kind
    pub fn lane_len(&self, kind: ItemKind) -> usize {
        self.lane(kind).lock().len()
    }

    /// Queued items across both lanes
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting new items; retries can still be requeued
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.space.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until items were added since the last wakeup
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }
}

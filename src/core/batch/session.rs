//! Batch session
//!
//! A session owns the queue, the assembler task, the worker pool and the
//! coordinator task, and holds a share of the client's backlog poller while it
//! runs. Items added to a session
//! are eventually recorded exactly once, as succeeded, failed or aborted.
//! `close` drains everything before stopping the tasks; `abort` discards what
//! is left and records it as aborted.

use super::assembler::{BatchAssembler, BatchSizer};
use super::dispatcher::{DispatchHandle, DispatchReport, DispatchStats, Dispatcher};
use super::governor::RateGovernor;
use super::queue::ItemQueue;
use super::reconcile::{Reconciler, Verdict};
use super::results::ResultSink;
use super::retry::{Decision, RetryCoordinator};
use super::types::{
    BatchOutcome, BatchSummary, DispatchOutcome, Envelope, Item, ItemError, ItemId, ObjectItem,
    OutcomeStatus, ReferenceItem,
};
use crate::config::{BatchConfig, RetryConfig};
use crate::storage::vector::BatchTransport;
use crate::utils::error::{BatchError, ErrorClass, Result};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RECONCILE_CONCURRENCY: usize = 8;

/// Everything a session borrows from its client
pub(crate) struct SessionContext {
    pub transport: Arc<dyn BatchTransport>,
    pub reconciler: Arc<dyn Reconciler>,
    pub sink: Arc<ResultSink>,
    pub governor: Arc<RateGovernor>,
    pub ids: Arc<AtomicU64>,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

#[derive(Debug, Default)]
struct SessionCounters {
    accepted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    retried: AtomicU64,
    /// Requests the store answered, successfully or not
    answered_batches: AtomicU64,
    /// Requests that ended without a usable answer
    ambiguous_batches: AtomicU64,
}

/// Items to send again after one report, plus those to reconcile first
#[derive(Debug, Default)]
struct RetryRound {
    resubmit: Vec<Envelope>,
    reconcile: Vec<Envelope>,
    round: u32,
}

impl RetryRound {
    fn is_empty(&self) -> bool {
        self.resubmit.is_empty() && self.reconcile.is_empty()
    }
}

struct Shared {
    queue: Arc<ItemQueue>,
    retry: RetryCoordinator,
    sink: Arc<ResultSink>,
    governor: Arc<RateGovernor>,
    transport: Arc<dyn BatchTransport>,
    reconciler: Arc<dyn Reconciler>,
    /// Items added but not yet terminal
    pending: AtomicUsize,
    drained: Notify,
    /// Callers currently waiting in `flush`
    flushing: AtomicUsize,
    flush_signal: Notify,
    aborted: AtomicBool,
    counters: SessionCounters,
    /// Ids recorded in the sink, released when the session ends
    recorded: Mutex<Vec<ItemId>>,
}

impl Shared {
    fn finish(&self, id: ItemId, item: Arc<Item>, status: OutcomeStatus) {
        let counter = match &status {
            OutcomeStatus::Succeeded => &self.counters.succeeded,
            OutcomeStatus::Failed { .. } => &self.counters.failed,
            OutcomeStatus::Aborted => &self.counters.aborted,
        };

        if self.sink.record(BatchOutcome::new(id, item, status)) {
            counter.fetch_add(1, Ordering::SeqCst);
            self.recorded.lock().push(id);
        }
        self.release_pending();
    }

    fn release_pending(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn apply(&self, id: ItemId, decision: Decision, round: &mut RetryRound) {
        match decision {
            Decision::Stale => debug!("Ignoring stale outcome for item {}", id),
            Decision::Succeeded(item) => self.finish(id, item, OutcomeStatus::Succeeded),
            Decision::Resubmit {
                envelope,
                round: item_round,
            } => {
                round.round = round.round.max(item_round);
                round.resubmit.push(envelope);
            }
            Decision::Reconcile(envelope) => round.reconcile.push(envelope),
            Decision::Failed(failure) => {
                warn!(
                    "Item {} failed ({}): {}",
                    failure.id, failure.class, failure.error
                );
                self.finish(
                    failure.id,
                    failure.item,
                    OutcomeStatus::Failed {
                        error: failure.error,
                        class: failure.class,
                        retries: failure.retries,
                    },
                );
            }
        }
    }

    fn process_report(self: &Arc<Self>, report: DispatchReport, sizer: &BatchSizer) {
        let DispatchReport {
            batch,
            result,
            elapsed,
        } = report;
        let len = batch.len();

        let outcomes = match result {
            Ok(outcomes) => {
                self.counters.answered_batches.fetch_add(1, Ordering::SeqCst);
                outcomes
            }
            Err(e) if e.is_ambiguous() => {
                self.counters
                    .ambiguous_batches
                    .fetch_add(1, Ordering::SeqCst);
                vec![DispatchOutcome::Ambiguous(e.to_string()); len]
            }
            Err(e) => {
                self.counters.answered_batches.fetch_add(1, Ordering::SeqCst);
                vec![DispatchOutcome::Error(request_error(&e)); len]
            }
        };

        sizer.record(len, elapsed, outcomes.iter().any(|o| !o.is_success()));

        let mut round = RetryRound::default();
        for (envelope, outcome) in batch.entries.into_iter().zip(outcomes) {
            let decision = match outcome {
                DispatchOutcome::Success => self.retry.on_success(envelope.id, envelope.generation),
                DispatchOutcome::Error(err) => {
                    self.retry.on_error(envelope.id, envelope.generation, err)
                }
                DispatchOutcome::Ambiguous(message) => {
                    self.retry
                        .on_ambiguous(envelope.id, envelope.generation, &message)
                }
            };
            self.apply(envelope.id, decision, &mut round);
        }

        if !round.is_empty() {
            tokio::spawn(self.clone().run_round(round));
        }
    }

    /// Reconcile, back off once, then put the round's items back in the queue
    async fn run_round(self: Arc<Self>, mut round: RetryRound) {
        let reconcile = std::mem::take(&mut round.reconcile);
        if !reconcile.is_empty() {
            debug!("Reconciling {} ambiguous items", reconcile.len());
            let verdicts: Vec<(Envelope, Verdict)> = stream::iter(reconcile)
                .map(|envelope| {
                    let shared = self.clone();
                    async move {
                        let verdict = match envelope.item.as_ref() {
                            Item::Object(object) => {
                                shared
                                    .reconciler
                                    .reconcile(&*shared.transport, object)
                                    .await
                            }
                            Item::Reference(_) => Verdict::Unknown,
                        };
                        (envelope, verdict)
                    }
                })
                .buffer_unordered(RECONCILE_CONCURRENCY)
                .collect()
                .await;

            for (envelope, verdict) in verdicts {
                let decision = self
                    .retry
                    .resolve(envelope.id, envelope.generation, verdict);
                self.apply(envelope.id, decision, &mut round);
            }
        }

        if round.resubmit.is_empty() {
            return;
        }

        let delay = self.retry.backoff(round.round);
        warn!(
            "Resubmitting {} items in {:?} (round {})",
            round.resubmit.len(),
            delay,
            round.round
        );
        tokio::time::sleep(delay).await;

        if self.aborted.load(Ordering::SeqCst) {
            return;
        }
        self.counters
            .retried
            .fetch_add(round.resubmit.len() as u64, Ordering::SeqCst);
        self.queue.requeue(round.resubmit);
    }
}

/// Per-item error for a request the store rejected as a whole
fn request_error(err: &BatchError) -> ItemError {
    match err {
        BatchError::Remote { status, message } => {
            ItemError::new(message.clone()).with_code(status.to_string())
        }
        other => {
            let code = match other.class() {
                ErrorClass::Validation => "INVALID_ARGUMENT",
                ErrorClass::Conflict => "ALREADY_EXISTS",
                _ => "UNAVAILABLE",
            };
            ItemError::new(other.to_string()).with_code(code)
        }
    }
}

async fn run_assembler(
    shared: Arc<Shared>,
    assembler: BatchAssembler,
    dispatch: DispatchHandle,
    mut stop: watch::Receiver<bool>,
    tick: Duration,
) {
    let dynamic = assembler.sizer().is_dynamic();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut tick_due = false;

    loop {
        let force_partial = tick_due || shared.flushing.load(Ordering::SeqCst) > 0;
        tick_due = false;

        while let Some(batch) = assembler.next_batch(force_partial) {
            shared.governor.acquire_slot().await;
            debug!("Submitting batch of {} {}s", batch.len(), batch.kind);
            if let Err(e) = dispatch.submit(batch).await {
                warn!("Assembler stopping: {}", e);
                return;
            }
        }

        if *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = shared.queue.wait_ready() => {}
            _ = shared.flush_signal.notified() => {}
            _ = ticker.tick() => tick_due = dynamic,
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn run_coordinator(
    shared: Arc<Shared>,
    sizer: Arc<BatchSizer>,
    mut reports: mpsc::UnboundedReceiver<DispatchReport>,
) {
    while let Some(report) = reports.recv().await {
        shared.process_report(report, &sizer);
    }
}

/// Scoped batching context.
///
/// Close it with [`BatchSession::close`] to drain, or [`BatchSession::abort`]
/// to discard. A session dropped without either is aborted.
pub struct BatchSession {
    shared: Arc<Shared>,
    stats: Arc<DispatchStats>,
    dispatcher: Option<Dispatcher>,
    stop: watch::Sender<bool>,
    assembler: Option<JoinHandle<()>>,
    coordinator: Option<JoinHandle<()>>,
    /// Attached to the governor's backlog poller
    polling: bool,
    drain_timeout: Option<Duration>,
    finished: bool,
}

impl std::fmt::Debug for BatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSession")
            .field("pending", &self.pending())
            .field("queued", &self.queued())
            .field("finished", &self.finished)
            .finish()
    }
}

impl BatchSession {
    /// Start the session's tasks; must run inside a tokio runtime
    pub(crate) fn start(context: SessionContext) -> Self {
        let SessionContext {
            transport,
            reconciler,
            sink,
            governor,
            ids,
            batch,
            retry,
            request_timeout,
        } = context;

        let queue = Arc::new(ItemQueue::new(batch.max_queue_len, ids));
        let sizer = Arc::new(BatchSizer::new(batch.sizing.clone()));
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (dispatcher, dispatch) = Dispatcher::spawn(
            transport.clone(),
            batch.concurrency,
            batch.max_in_flight_batches,
            request_timeout,
            report_tx,
        );

        let shared = Arc::new(Shared {
            queue: queue.clone(),
            retry: RetryCoordinator::new(retry),
            sink,
            governor: governor.clone(),
            transport: transport.clone(),
            reconciler,
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            flushing: AtomicUsize::new(0),
            flush_signal: Notify::new(),
            aborted: AtomicBool::new(false),
            counters: SessionCounters::default(),
            recorded: Mutex::new(Vec::new()),
        });

        let (stop, stop_rx) = watch::channel(false);
        let assembler = tokio::spawn(run_assembler(
            shared.clone(),
            BatchAssembler::new(queue, sizer.clone()),
            dispatch,
            stop_rx,
            batch.flush_interval(),
        ));
        let coordinator = tokio::spawn(run_coordinator(shared.clone(), sizer, report_rx));
        let polling = governor.attach_poller(transport);

        info!(
            "Batch session started (sizing={:?}, concurrency={})",
            batch.sizing, batch.concurrency
        );

        Self {
            shared,
            stats: dispatcher.stats(),
            dispatcher: Some(dispatcher),
            stop,
            assembler: Some(assembler),
            coordinator: Some(coordinator),
            polling,
            drain_timeout: batch.drain_timeout(),
            finished: false,
        }
    }

    /// Queue an object for creation; a v4 uuid is assigned when absent
    pub async fn add_object(&self, mut object: ObjectItem) -> Result<ItemId> {
        if object.collection.trim().is_empty() {
            return Err(BatchError::validation("Object collection cannot be empty"));
        }
        if object.uuid.is_none() {
            object.uuid = Some(Uuid::new_v4());
        }
        self.add(Item::Object(object)).await
    }

    /// Queue a reference for creation
    pub async fn add_reference(&self, reference: ReferenceItem) -> Result<()> {
        if reference.from_collection.trim().is_empty() || reference.from_property.trim().is_empty()
        {
            return Err(BatchError::validation(
                "Reference source collection and property cannot be empty",
            ));
        }
        self.add(Item::Reference(reference)).await.map(|_| ())
    }

    async fn add(&self, item: Item) -> Result<ItemId> {
        if self.shared.aborted.load(Ordering::SeqCst) {
            return Err(BatchError::session_closed("Session was aborted"));
        }

        let envelope = Envelope::new(self.shared.queue.next_id(), item);
        let id = envelope.id;
        self.shared.governor.observe(&envelope.item);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.retry.register(&envelope);

        match self.shared.queue.enqueue(envelope).await {
            Ok(id) => {
                self.shared.counters.accepted.fetch_add(1, Ordering::SeqCst);
                Ok(id)
            }
            Err(e) => {
                if self.shared.retry.forget(id) {
                    self.shared.release_pending();
                }
                Err(e)
            }
        }
    }

    /// Dispatch everything queued, including partial batches, and wait until
    /// every item added so far is terminal
    pub async fn flush(&self) -> Result<()> {
        self.shared.flushing.fetch_add(1, Ordering::SeqCst);
        self.shared.flush_signal.notify_one();

        let result = match self.drain_timeout {
            Some(limit) => tokio::time::timeout(limit, self.shared.wait_drained())
                .await
                .map_err(|_| {
                    BatchError::timeout(format!(
                        "{} items still pending after {:?}",
                        self.pending(),
                        limit
                    ))
                }),
            None => {
                self.shared.wait_drained().await;
                Ok(())
            }
        };

        self.shared.flushing.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Stop accepting items, drain, stop the tasks and summarize.
    ///
    /// Fails with a timeout when the drain exceeds the configured bound (the
    /// remaining items are recorded as aborted), and with a network error when
    /// the store never answered a single request and items were lost to it.
    pub async fn close(mut self) -> Result<BatchSummary> {
        self.shared.queue.close();

        if let Err(e) = self.flush().await {
            warn!("Session drain failed, aborting remaining items: {}", e);
            self.abort_inner();
            return Err(e);
        }

        self.shutdown().await;
        self.release_recorded();
        self.finished = true;

        let summary = self.summary();
        let answered = self.shared.counters.answered_batches.load(Ordering::SeqCst);
        let ambiguous = self.shared.counters.ambiguous_batches.load(Ordering::SeqCst);
        if answered == 0 && ambiguous > 0 && summary.failed > 0 {
            return Err(BatchError::network(format!(
                "Store unreachable: {} batches failed without a response, {} items failed",
                ambiguous, summary.failed
            )));
        }

        info!(
            "Batch session closed: {} succeeded, {} failed, {} retried, {} batches",
            summary.succeeded, summary.failed, summary.retried, summary.batches_sent
        );
        Ok(summary)
    }

    /// Discard queued and in-flight items, recording them as aborted
    pub fn abort(mut self) -> BatchSummary {
        self.abort_inner();
        let summary = self.summary();
        warn!("Batch session aborted: {} items discarded", summary.aborted);
        summary
    }

    async fn shutdown(&mut self) {
        let _ = self.stop.send(true);
        if let Some(assembler) = self.assembler.take() {
            let _ = assembler.await;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().await;
        }
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.await;
        }
        self.detach_poller();
    }

    fn detach_poller(&mut self) {
        if std::mem::take(&mut self.polling) {
            self.shared.governor.detach_poller();
        }
    }

    fn abort_inner(&mut self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        self.shared.queue.close();
        let _ = self.stop.send(true);

        for handle in [self.assembler.take(), self.coordinator.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        self.detach_poller();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }

        let dropped = self.shared.queue.drain_all();
        debug!("Dropped {} queued items", dropped.len());
        for (id, item) in self.shared.retry.drain() {
            self.shared.finish(id, item, OutcomeStatus::Aborted);
        }
        self.release_recorded();
        self.finished = true;
    }

    /// Every item of the session is terminal; stop deduplicating its ids
    fn release_recorded(&self) {
        let ids = std::mem::take(&mut *self.shared.recorded.lock());
        self.shared.sink.release(&ids);
    }

    /// Items added but not yet terminal
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Items waiting in the queue
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Terminal failures in this session
    pub fn number_errors(&self) -> u64 {
        self.shared.counters.failed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Counters so far
    pub fn summary(&self) -> BatchSummary {
        let counters = &self.shared.counters;
        BatchSummary {
            total: counters.accepted.load(Ordering::SeqCst),
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            aborted: counters.aborted.load(Ordering::SeqCst),
            retried: counters.retried.load(Ordering::SeqCst),
            batches_sent: self.stats.batches_sent(),
            items_processed: self.stats.items_processed(),
        }
    }
}

impl Drop for BatchSession {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Batch session dropped without close, aborting pending items");
            self.abort_inner();
        }
    }
}

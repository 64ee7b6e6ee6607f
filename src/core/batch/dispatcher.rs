//! Dispatcher and worker pool
//!
//! Assembled batches are handed to a bounded channel. A fixed pool of workers
//! pulls from it, sends each batch through the transport under a request
//! timeout and reports the raw result to the coordinator.

use super::types::{Batch, DispatchOutcome, ItemKind};
use crate::storage::vector::BatchTransport;
use crate::utils::error::{BatchError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of dispatching one batch
#[derive(Debug)]
pub struct DispatchReport {
    pub batch: Batch,
    /// One outcome per entry on success, or the request-level error
    pub result: Result<Vec<DispatchOutcome>>,
    pub elapsed: Duration,
}

/// Dispatch counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    batches_sent: AtomicU64,
    items_processed: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl DispatchStats {
    /// Requests sent to the store
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    /// Items carried by requests the store answered; never decreases
    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    /// Highest number of concurrent requests observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }
}

/// Cloneable submission side of the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<Batch>,
}

impl DispatchHandle {
    /// Queue a batch for the workers, waiting while the in-flight bound is reached
    pub async fn submit(&self, batch: Batch) -> Result<()> {
        self.sender
            .send(batch)
            .await
            .map_err(|_| BatchError::session_closed("Dispatcher has shut down"))
    }
}

/// Fixed-size worker pool
#[derive(Debug)]
pub struct Dispatcher {
    sender: Option<mpsc::Sender<Batch>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Start `concurrency` workers reporting to `reports`
    pub fn spawn(
        transport: Arc<dyn BatchTransport>,
        concurrency: usize,
        max_in_flight_batches: usize,
        request_timeout: Duration,
        reports: mpsc::UnboundedSender<DispatchReport>,
    ) -> (Self, DispatchHandle) {
        let (sender, receiver) = mpsc::channel(max_in_flight_batches.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..concurrency.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    transport.clone(),
                    receiver.clone(),
                    reports.clone(),
                    stats.clone(),
                    request_timeout,
                ))
            })
            .collect();

        let handle = DispatchHandle {
            sender: sender.clone(),
        };
        (
            Self {
                sender: Some(sender),
                workers,
                stats,
            },
            handle,
        )
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Stop accepting batches and wait for the workers to finish what is queued.
    ///
    /// Workers exit once every [`DispatchHandle`] is dropped too.
    pub async fn shutdown(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    warn!("Dispatch worker failed: {}", e);
                }
            }
        }
    }

    /// Cancel every worker, abandoning in-flight requests
    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn run_worker(
    worker: usize,
    transport: Arc<dyn BatchTransport>,
    receiver: Arc<Mutex<mpsc::Receiver<Batch>>>,
    reports: mpsc::UnboundedSender<DispatchReport>,
    stats: Arc<DispatchStats>,
    request_timeout: Duration,
) {
    loop {
        let batch = { receiver.lock().await.recv().await };
        let Some(batch) = batch else {
            break;
        };

        let in_flight = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        stats.batches_sent.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let result = match tokio::time::timeout(request_timeout, send(&*transport, &batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(BatchError::timeout(format!(
                "Batch of {} {}s timed out after {:?}",
                batch.len(),
                batch.kind,
                request_timeout
            ))),
        };
        let elapsed = started.elapsed();
        stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &result {
            Ok(_) => {
                stats
                    .items_processed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(
                    "Worker {} sent {} {}s in {:?}",
                    worker,
                    batch.len(),
                    batch.kind,
                    elapsed
                );
            }
            Err(e) => warn!("Worker {} batch of {} failed: {}", worker, batch.len(), e),
        }

        if reports
            .send(DispatchReport {
                batch,
                result,
                elapsed,
            })
            .is_err()
        {
            break;
        }
    }
}

async fn send(transport: &dyn BatchTransport, batch: &Batch) -> Result<Vec<DispatchOutcome>> {
    let outcomes = match batch.kind {
        ItemKind::Object => transport.send_objects(&batch.objects()).await?,
        ItemKind::Reference => transport.send_references(&batch.references()).await?,
    };

    if outcomes.len() != batch.len() {
        return Err(BatchError::parsing(format!(
            "Transport returned {} outcomes for {} items",
            outcomes.len(),
            batch.len()
        )));
    }
    Ok(outcomes)
}

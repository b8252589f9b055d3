//! Bounded worker pool draining the ingestion queue
//!
//! Intake pushes jobs onto a bounded channel; a fixed number of workers
//! share the receiver and ingest one job at a time each. A job that panics
//! fails its upload and leaves the worker running.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::config::IngestConfig;
use super::coordinator::IngestionCoordinator;
use crate::store::DocumentStore;

/// One uploaded file waiting to be ingested.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub upload_id: Uuid,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Producer side of the job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<IngestJob>,
}

/// Capacity reserved on the queue; sending through it cannot fail or block.
pub struct QueueSlots<'a> {
    permits: Vec<mpsc::Permit<'a, IngestJob>>,
}

impl<'a> QueueSlots<'a> {
    pub fn len(&self) -> usize {
        self.permits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permits.is_empty()
    }

    /// Enqueue jobs in order, one per reserved slot. Extra jobs are returned.
    pub fn send(self, jobs: impl IntoIterator<Item = IngestJob>) -> Vec<IngestJob> {
        let mut permits = self.permits.into_iter();
        let mut leftover = Vec::new();
        for job in jobs {
            match permits.next() {
                Some(permit) => permit.send(job),
                None => leftover.push(job),
            }
        }
        leftover
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full,
    Closed,
}

impl JobQueue {
    /// A queue of `capacity` jobs and the receiving end workers drain.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<IngestJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Reserve `count` slots at once, or none.
    pub fn try_reserve(&self, count: usize) -> Result<QueueSlots<'_>, QueueError> {
        let mut permits = Vec::with_capacity(count);
        for _ in 0..count {
            match self.tx.try_reserve() {
                Ok(permit) => permits.push(permit),
                Err(mpsc::error::TrySendError::Full(())) => return Err(QueueError::Full),
                Err(mpsc::error::TrySendError::Closed(())) => return Err(QueueError::Closed),
            }
        }
        Ok(QueueSlots { permits })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `config.workers` workers over a queue of `config.queue_capacity` jobs.
    pub fn spawn<S: DocumentStore>(
        coordinator: Arc<IngestionCoordinator<S>>,
        config: &IngestConfig,
    ) -> (JobQueue, WorkerPool) {
        let (queue, rx) = JobQueue::bounded(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(run_worker(worker, rx, coordinator))
            })
            .collect();
        info!(workers = config.workers, queue_capacity = config.queue_capacity, "Ingestion workers started");
        (queue, WorkerPool { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to finish. Workers stop once all queue senders
    /// are dropped and the remaining jobs are drained.
    pub async fn shutdown(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Ingestion worker terminated abnormally");
            }
        }
        info!("Ingestion workers stopped");
    }
}

async fn run_worker<S: DocumentStore>(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<IngestJob>>>,
    coordinator: Arc<IngestionCoordinator<S>>,
) {
    debug!(worker, "Worker waiting for jobs");
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };

        debug!(worker, upload_id = %job.upload_id, filename = %job.filename, "Picked up job");
        let run = AssertUnwindSafe(coordinator.ingest(job.upload_id, &job.content)).catch_unwind();
        if run.await.is_err() {
            error!(worker, upload_id = %job.upload_id, "Ingestion panicked");
            coordinator
                .record_failure(job.upload_id, "Internal error while processing the document")
                .await;
        }
    }
    debug!(worker, "Job queue closed, worker exiting");
}

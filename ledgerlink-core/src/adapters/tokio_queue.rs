//! In-process job queue on tokio
//!
//! Delayed jobs sleep on their own task and are then pushed onto an
//! unbounded channel drained by the job runner. A shared pending counter
//! covers jobs that are sleeping, queued or running, so the runner can
//! tell when the queue has gone idle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::result::{Error, Result};
use crate::domain::JobEnvelope;
use crate::ports::JobQueue;

/// A job held back because its delay exceeds the queue's horizon
#[derive(Debug, Clone)]
pub struct DeferredJob {
    pub envelope: JobEnvelope,
    pub delay: Duration,
}

pub struct TokioJobQueue {
    sender: mpsc::UnboundedSender<JobEnvelope>,
    pending: Arc<AtomicUsize>,
    defer_beyond: Option<Duration>,
    deferred: Mutex<Vec<DeferredJob>>,
}

/// Receiving half, owned by the job runner
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<JobEnvelope>,
    pending: Arc<AtomicUsize>,
}

impl TokioJobQueue {
    pub fn new() -> (Arc<Self>, JobReceiver) {
        Self::build(None)
    }

    /// Queue for one-shot runs: jobs delayed longer than `horizon` are not
    /// scheduled but kept in [`TokioJobQueue::deferred`]
    pub fn with_horizon(horizon: Duration) -> (Arc<Self>, JobReceiver) {
        Self::build(Some(horizon))
    }

    fn build(defer_beyond: Option<Duration>) -> (Arc<Self>, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(Self {
            sender,
            pending: pending.clone(),
            defer_beyond,
            deferred: Mutex::new(Vec::new()),
        });
        (queue, JobReceiver { receiver, pending })
    }

    pub fn deferred(&self) -> Vec<DeferredJob> {
        self.deferred.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn enqueue(&self, envelope: JobEnvelope, delay: Duration) -> Result<()> {
        if matches!(self.defer_beyond, Some(horizon) if delay > horizon) {
            tracing::debug!(job = envelope.job.name(), delay_secs = delay.as_secs(), "Job deferred");
            self.deferred
                .lock()
                .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))?
                .push(DeferredJob { envelope, delay });
            return Ok(());
        }

        self.pending.fetch_add(1, Ordering::SeqCst);

        if delay.is_zero() {
            return self.sender.send(envelope).map_err(|_| {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Error::Other("Job queue closed".to_string())
            });
        }

        let sender = self.sender.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(envelope).is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        });
        Ok(())
    }
}

impl JobReceiver {
    /// Next runnable job
    pub async fn recv(&mut self) -> Option<JobEnvelope> {
        self.receiver.recv().await
    }

    /// Mark a received job as finished
    pub fn complete(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Jobs sleeping, queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

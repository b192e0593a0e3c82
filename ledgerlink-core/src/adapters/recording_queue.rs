//! Job queue that records dispatches instead of running them
//!
//! Used by tests to assert on fan-out and by `ledgerlink sync --plan` to
//! show what a sync would dispatch.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::result::{Error, Result};
use crate::domain::{Job, JobEnvelope};
use crate::ports::JobQueue;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub job: Job,
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Default)]
pub struct RecordingQueue {
    scheduled: Mutex<Vec<ScheduledJob>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in dispatch order
    pub fn scheduled(&self) -> Vec<ScheduledJob> {
        self.scheduled.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Dispatches of one job type
    pub fn named(&self, name: &str) -> Vec<ScheduledJob> {
        self.scheduled()
            .into_iter()
            .filter(|s| s.job.name() == name)
            .collect()
    }

    /// Drain the recorded dispatches
    pub fn take(&self) -> Vec<ScheduledJob> {
        self.scheduled
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, envelope: JobEnvelope, delay: Duration) -> Result<()> {
        self.scheduled
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))?
            .push(ScheduledJob {
                job: envelope.job,
                attempt: envelope.attempt,
                delay,
            });
        Ok(())
    }
}

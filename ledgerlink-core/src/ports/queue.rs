//! Job queue port
//!
//! `schedule(job, delay)` is the whole dispatch contract: a job becomes
//! runnable once `delay` has elapsed. Duplicate dispatch is tolerated by
//! the jobs themselves.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{Job, JobEnvelope};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue an envelope (used directly by the runner for retries)
    async fn enqueue(&self, envelope: JobEnvelope, delay: Duration) -> Result<()>;

    /// Dispatch a fresh job
    async fn schedule(&self, job: Job, delay: Duration) -> Result<()> {
        self.enqueue(JobEnvelope::new(job), delay).await
    }
}

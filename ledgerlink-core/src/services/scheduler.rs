//! Cron schedules for the sweeps and the periodic sync

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{info, warn};

use crate::config::ScheduleSettings;
use crate::domain::result::{Error, Result};
use crate::domain::Job;
use crate::ports::JobQueue;

/// Pairs each cron expression with the job it dispatches
pub fn scheduled_jobs(schedule: &ScheduleSettings) -> Vec<(String, Job)> {
    vec![
        (schedule.expiring_sweep.clone(), Job::SweepExpiring),
        (schedule.disconnected_sweep.clone(), Job::SweepDisconnected),
        (schedule.sync_all.clone(), Job::SyncAll),
    ]
}

/// Build and start a scheduler that pushes jobs onto `queue`
pub async fn start(schedule: &ScheduleSettings, queue: Arc<dyn JobQueue>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| Error::config(format!("Failed to create scheduler: {}", e)))?;

    for (cron, job) in scheduled_jobs(schedule) {
        let queue = queue.clone();
        let name = job.name();
        let cron_job = CronJob::new_async(cron.as_str(), move |_uuid, _lock| {
            let queue = queue.clone();
            let job = job.clone();
            Box::pin(async move {
                if let Err(e) = queue.schedule(job, Duration::ZERO).await {
                    warn!(error = %e, "Failed to dispatch scheduled job");
                }
            })
        })
        .map_err(|e| Error::config(format!("Invalid cron expression '{}': {}", cron, e)))?;

        scheduler
            .add(cron_job)
            .await
            .map_err(|e| Error::config(format!("Failed to add scheduled job: {}", e)))?;
        info!(job = name, %cron, "Scheduled");
    }

    scheduler
        .start()
        .await
        .map_err(|e| Error::config(format!("Failed to start scheduler: {}", e)))?;
    Ok(scheduler)
}

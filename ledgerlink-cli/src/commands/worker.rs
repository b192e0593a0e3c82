//! Worker command - job runner plus cron schedule

use anyhow::{Context, Result};
use tracing::{info, warn};

use ledgerlink_core::adapters::tokio_queue::TokioJobQueue;
use ledgerlink_core::services::{scheduler, EntryPoint};

use super::{get_context, get_event_log};
use crate::output;

pub async fn run() -> Result<()> {
    let ctx = get_context()?;
    let (queue, mut receiver) = TokioJobQueue::new();

    let mut runner = ctx.runner(queue.clone());
    if let Some(event_log) = get_event_log(EntryPoint::Worker) {
        runner = runner.with_event_log(event_log);
    }

    let mut cron = scheduler::start(&ctx.config.schedule, queue.clone())
        .await
        .context("Failed to start cron schedule")?;
    info!(
        environment = %ctx.config.environment,
        providers = ?ctx.providers.providers(),
        notifier = ctx.notifier.name(),
        "Worker started"
    );
    output::info("Worker running, press Ctrl-C to stop");

    let summary = runner
        .run(&mut receiver, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    if let Err(e) = cron.shutdown().await {
        warn!(error = %e, "Cron scheduler did not shut down cleanly");
    }
    output::info(&format!(
        "Stopped: {} succeeded, {} retried, {} failed",
        summary.succeeded, summary.retried, summary.gave_up
    ));
    Ok(())
}

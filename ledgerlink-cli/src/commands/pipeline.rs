//! Running a job and its follow-ups inside one CLI invocation
//!
//! Follow-up jobs run on an in-process queue until it drains. Jobs delayed
//! past [`ONE_SHOT_HORIZON`] (connection recovery backoff, for example) are
//! reported instead of waited for; the worker owns those schedules.

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use ledgerlink_core::adapters::recording_queue::RecordingQueue;
use ledgerlink_core::adapters::tokio_queue::TokioJobQueue;
use ledgerlink_core::ports::JobQueue;
use ledgerlink_core::services::{EntryPoint, JobOutcome, RunSummary};
use ledgerlink_core::{Job, LedgerlinkContext};

use super::get_event_log;
use crate::output;

/// Longest follow-up delay a one-shot run waits for
///
/// Covers the manual-sync transaction notification.
pub const ONE_SHOT_HORIZON: Duration = Duration::from_secs(180);

/// Run `job` and everything it dispatches within the horizon
pub async fn run_job(ctx: &LedgerlinkContext, job: Job, json: bool) -> Result<()> {
    let (queue, mut receiver) = TokioJobQueue::with_horizon(ONE_SHOT_HORIZON);
    let mut runner = ctx.runner(queue.clone());
    if let Some(event_log) = get_event_log(EntryPoint::Cli) {
        runner = runner.with_event_log(event_log);
    }

    let name = job.name();
    queue
        .schedule(job, Duration::ZERO)
        .await
        .context("Failed to queue job")?;

    let spinner = (!json && std::io::stdout().is_terminal()).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Running {} and its follow-up jobs", name));
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    });

    let summary = runner.run_until_idle(&mut receiver).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let deferred: Vec<_> = queue
        .deferred()
        .into_iter()
        .map(|d| {
            json!({
                "job": d.envelope.job.name(),
                "delaySecs": d.delay.as_secs(),
                "payload": d.envelope.job,
            })
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "summary": summary, "deferred": deferred }))?
        );
    } else {
        print_summary(&summary);
        if !deferred.is_empty() {
            println!();
            output::warning("Not run in this session (delay beyond the one-shot window):");
            for d in &deferred {
                println!(
                    "  {} in {}",
                    d["job"].as_str().unwrap_or_default(),
                    output::format_delay(d["delaySecs"].as_u64().unwrap_or_default())
                );
            }
        }
    }

    if summary.gave_up > 0 {
        bail!("{} job(s) failed", summary.gave_up);
    }
    Ok(())
}

/// Run only `job` itself and list what it would dispatch
pub async fn plan_job(ctx: &LedgerlinkContext, job: Job, json: bool) -> Result<()> {
    let queue = std::sync::Arc::new(RecordingQueue::new());
    let runner = ctx.runner(queue.clone());

    let output = runner
        .execute(&job)
        .await
        .with_context(|| format!("{} failed", job.name()))?;
    let dispatched: Vec<_> = queue
        .scheduled()
        .into_iter()
        .map(|s| json!({ "job": s.job.name(), "delaySecs": s.delay.as_secs(), "payload": s.job }))
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "output": output, "dispatched": dispatched }))?
        );
        return Ok(());
    }

    println!("{} {}", "Ran:".green(), job.name());
    println!("{}", serde_json::to_string_pretty(&output)?);
    println!();

    if dispatched.is_empty() {
        println!("{}", "No follow-up jobs dispatched".dimmed());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Follow-up job", "Delay"]);
    for d in &dispatched {
        table.add_row(vec![
            d["job"].as_str().unwrap_or_default().to_string(),
            output::format_delay(d["delaySecs"].as_u64().unwrap_or_default()),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let mut table = output::create_table();
    table.set_header(vec!["Job", "Attempt", "Outcome", "Detail"]);

    for report in &summary.reports {
        let (outcome, detail) = match &report.outcome {
            JobOutcome::Succeeded { output } => ("ok".green().to_string(), compact(output)),
            JobOutcome::RetryScheduled { error, delay_secs } => (
                "retry".yellow().to_string(),
                format!("{} (retry in {})", error, output::format_delay(*delay_secs)),
            ),
            JobOutcome::GaveUp { error, .. } => ("failed".red().to_string(), error.clone()),
        };
        table.add_row(vec![
            report.job.to_string(),
            report.attempt.to_string(),
            outcome,
            detail,
        ]);
    }

    println!("{}", table);
    println!(
        "{} succeeded, {} retried, {} failed",
        summary.succeeded, summary.retried, summary.gave_up
    );
}

/// One-line rendering of a job's JSON output
fn compact(value: &serde_json::Value) -> String {
    match value.as_object() {
        Some(fields) => fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{}={}", k, s),
                None => format!("{}={}", k, v),
            })
            .collect::<Vec<_>>()
            .join(" "),
        None => value.to_string(),
    }
}

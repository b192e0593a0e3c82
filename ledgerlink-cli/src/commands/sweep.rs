//! Sweep command - run the expiring or disconnected sweep on demand

use anyhow::Result;
use clap::Subcommand;

use ledgerlink_core::Job;

use super::get_context;
use super::pipeline::run_job;
use crate::output;

#[derive(Subcommand)]
pub enum SweepCommands {
    /// Warn about connections nearing expiry or inactivity limits
    Expiring {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Escalate and auto-disable long-broken connections
    Disconnected {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(command: SweepCommands) -> Result<()> {
    let ctx = get_context()?;
    let (job, json) = match command {
        SweepCommands::Expiring { json } => (Job::SweepExpiring, json),
        SweepCommands::Disconnected { json } => (Job::SweepDisconnected, json),
    };

    if !json && !ctx.config.environment.is_production() {
        output::warning(&format!(
            "Sweeps only act in production (current environment: {})",
            ctx.config.environment
        ));
    }
    run_job(&ctx, job, json).await
}

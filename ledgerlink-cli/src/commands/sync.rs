//! Sync command - check a connection and sync its accounts

use anyhow::Result;
use uuid::Uuid;

use ledgerlink_core::Job;

use super::get_context;
use super::pipeline::{plan_job, run_job};

pub async fn run(connection_id: Uuid, manual: bool, plan: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let job = Job::SyncConnection {
        connection_id,
        manual_sync: manual,
    };

    if plan {
        plan_job(&ctx, job, json).await
    } else {
        run_job(&ctx, job, json).await
    }
}

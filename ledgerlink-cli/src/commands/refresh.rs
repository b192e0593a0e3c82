//! Refresh command - exchange a connection's refresh token

use anyhow::Result;
use uuid::Uuid;

use ledgerlink_core::Job;

use super::get_context;
use super::pipeline::run_job;

pub async fn run(connection_id: Uuid, json: bool) -> Result<()> {
    let ctx = get_context()?;
    run_job(&ctx, Job::RefreshConnection { connection_id }, json).await
}

//! Recover command - run one connection recovery attempt now

use anyhow::{anyhow, Result};
use uuid::Uuid;

use ledgerlink_core::ports::ConnectionStore;
use ledgerlink_core::Job;

use super::get_context;
use super::pipeline::run_job;

pub async fn run(connection_id: Uuid, retry_count: u32, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let connection = ctx
        .store
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| anyhow!("Connection {} not found", connection_id))?;

    let job = Job::ConnectionRecovery {
        connection_id,
        provider: connection.provider,
        retry_count,
    };
    run_job(&ctx, job, json).await
}

//! CLI command implementations

pub mod connections;
pub mod init;
pub mod logs;
pub mod pipeline;
pub mod recover;
pub mod refresh;
pub mod sweep;
pub mod sync;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ledgerlink_core::services::{EntryPoint, LoggingService};
use ledgerlink_core::LedgerlinkContext;

/// Data directory from `LEDGERLINK_DIR` or the default
pub fn get_data_dir() -> PathBuf {
    ledgerlink_core::config::data_dir()
}

/// Open the database and provider clients
pub fn get_context() -> Result<LedgerlinkContext> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    LedgerlinkContext::open(&data_dir).context("Failed to initialize ledgerlink context")
}

/// Job event log, or None if it cannot be opened (never blocks a command)
pub fn get_event_log(entry_point: EntryPoint) -> Option<Arc<LoggingService>> {
    match LoggingService::new(&get_data_dir(), entry_point, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::warn!(error = %e, "Job event log unavailable");
            None
        }
    }
}

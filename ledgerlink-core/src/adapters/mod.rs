//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the ConnectionStore port
//! - Plaid HTTP client for ProviderClient
//! - tokio channel queue and a recording queue for JobQueue
//! - webhook and log notifiers for Notifier

pub mod duckdb;
pub mod notifier;
pub mod plaid;
pub mod recording_queue;
pub mod tokio_queue;

#[cfg(test)]
pub mod plaid_mock;

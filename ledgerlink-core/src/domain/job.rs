//! Job payloads dispatched through the job queue
//!
//! Payloads carry identifiers only. Access tokens and other secrets are
//! read from the store when the job runs, so nothing sensitive sits in a
//! queue or a log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::Provider;
use super::notification::Notification;

/// A unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum Job {
    #[serde(rename_all = "camelCase")]
    SyncConnection { connection_id: Uuid, manual_sync: bool },

    #[serde(rename_all = "camelCase")]
    SyncAccount {
        connection_id: Uuid,
        bank_account_id: Uuid,
        manual_sync: bool,
        user_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    UpsertTransactions {
        connection_id: Uuid,
        bank_account_id: Uuid,
        manual_sync: bool,
    },

    /// Tell the user about transactions created since `since`
    #[serde(rename_all = "camelCase")]
    TransactionNotification {
        connection_id: Uuid,
        since: DateTime<Utc>,
    },

    #[serde(rename_all = "camelCase")]
    ConnectionRecovery {
        connection_id: Uuid,
        provider: Provider,
        retry_count: u32,
    },

    ConnectionNotification(Notification),

    #[serde(rename_all = "camelCase")]
    RefreshConnection { connection_id: Uuid },

    SweepExpiring,

    SweepDisconnected,

    SyncAll,
}

impl Job {
    /// Dispatch name, also the registry key
    pub fn name(&self) -> &'static str {
        match self {
            Job::SyncConnection { .. } => "sync-connection",
            Job::SyncAccount { .. } => "sync-account",
            Job::UpsertTransactions { .. } => "upsert-transactions",
            Job::TransactionNotification { .. } => "transaction-notification",
            Job::ConnectionRecovery { .. } => "connection-recovery",
            Job::ConnectionNotification(_) => "connection-notification",
            Job::RefreshConnection { .. } => "refresh-connection",
            Job::SweepExpiring => "sweep-expiring",
            Job::SweepDisconnected => "sweep-disconnected",
            Job::SyncAll => "sync-all",
        }
    }

    /// Connection the job acts on, if any
    pub fn connection_id(&self) -> Option<Uuid> {
        match self {
            Job::SyncConnection { connection_id, .. }
            | Job::SyncAccount { connection_id, .. }
            | Job::UpsertTransactions { connection_id, .. }
            | Job::TransactionNotification { connection_id, .. }
            | Job::ConnectionRecovery { connection_id, .. }
            | Job::RefreshConnection { connection_id } => Some(*connection_id),
            Job::ConnectionNotification(_)
            | Job::SweepExpiring
            | Job::SweepDisconnected
            | Job::SyncAll => None,
        }
    }
}

/// A job plus its delivery bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub job: Job,
    /// 1 for the first run
    pub attempt: u32,
}

impl JobEnvelope {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt: 1,
        }
    }

    /// Same job, next attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            id: self.id,
            job: self.job.clone(),
            attempt: self.attempt + 1,
        }
    }
}

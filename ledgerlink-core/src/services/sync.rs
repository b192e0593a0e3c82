//! Sync orchestrator - provider health check and per-account fan-out
//!
//! One `sync-connection` job checks the item with the provider, records
//! the resulting status and dispatches a staggered `sync-account` job per
//! account. Manual syncs also schedule the new-transactions notification.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{AccountStatus, BankConnection, ConnectionStatus, Job};
use crate::ports::{ConnectionStore, JobQueue, ProviderRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    /// Connection disabled or disconnected, nothing dispatched
    Skipped,
    /// Provider reported a problem with the item, no fan-out
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncConnectionOutcome {
    pub status: SyncStatus,
    pub connection_status: ConnectionStatus,
    /// Number of `sync-account` jobs dispatched
    pub accounts_synced: usize,
}

pub struct SyncOrchestrator {
    store: Arc<dyn ConnectionStore>,
    providers: ProviderRegistry,
    queue: Arc<dyn JobQueue>,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        queue: Arc<dyn JobQueue>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            providers,
            queue,
            settings,
        }
    }

    /// Check one connection and fan out its account syncs
    ///
    /// On failure the connection status and message are persisted before
    /// the error is returned to the caller.
    pub async fn sync_connection(
        &self,
        connection_id: Uuid,
        manual_sync: bool,
    ) -> Result<SyncConnectionOutcome> {
        let mut connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;

        if !connection.is_syncable() {
            debug!(%connection_id, status = %connection.status, "Skipping sync of inactive connection");
            return Ok(SyncConnectionOutcome {
                status: SyncStatus::Skipped,
                connection_status: connection.status,
                accounts_synced: 0,
            });
        }

        match self.check_and_fan_out(&mut connection, manual_sync).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.record_failure(&mut connection, &e).await;
                Err(e)
            }
        }
    }

    async fn check_and_fan_out(
        &self,
        connection: &mut BankConnection,
        manual_sync: bool,
    ) -> Result<SyncConnectionOutcome> {
        let started_at = Utc::now();
        let client = self.providers.get(connection.provider)?;
        let item = client.get_item_details(&connection.access_token).await?;

        let now = Utc::now();
        let status = ConnectionStatus::from_item_error(item.error.as_ref());
        connection.transition_to(status, now)?;
        connection.last_checked_at = Some(now);
        connection.error_message = item.error.as_ref().map(|e| e.message.clone());
        if item.institution_id.is_some() {
            connection.institution_id = item.institution_id.clone();
        }
        if item.institution_name.is_some() {
            connection.institution_name = item.institution_name.clone();
        }
        if item.consent_expires_at.is_some() {
            connection.expires_at = item.consent_expires_at;
        }

        if let Some(error) = &item.error {
            self.store.update_connection(connection).await?;
            warn!(connection_id = %connection.id, %status, code = %error.code, "Provider reported item error");
            if status == ConnectionStatus::Error {
                self.queue
                    .schedule(
                        Job::ConnectionRecovery {
                            connection_id: connection.id,
                            provider: connection.provider,
                            retry_count: 0,
                        },
                        Duration::ZERO,
                    )
                    .await?;
            }
            return Ok(SyncConnectionOutcome {
                status: SyncStatus::Unhealthy,
                connection_status: status,
                accounts_synced: 0,
            });
        }

        connection.last_synced_at = Some(now);
        if manual_sync {
            connection.last_accessed_at = Some(now);
        }
        self.store.update_connection(connection).await?;

        let accounts: Vec<_> = self
            .store
            .list_accounts(connection.id)
            .await?
            .into_iter()
            .filter(|a| a.enabled && (manual_sync || a.status == AccountStatus::Active))
            .collect();

        let stagger = self.settings.stagger(manual_sync);
        for (i, account) in accounts.iter().enumerate() {
            self.queue
                .schedule(
                    Job::SyncAccount {
                        connection_id: connection.id,
                        bank_account_id: account.id,
                        manual_sync,
                        user_id: connection.user_id,
                    },
                    stagger * i as u32,
                )
                .await?;
        }

        if manual_sync {
            self.queue
                .schedule(
                    Job::TransactionNotification {
                        connection_id: connection.id,
                        since: started_at,
                    },
                    Duration::from_secs(self.settings.notification_delay_secs),
                )
                .await?;
        }

        info!(
            connection_id = %connection.id,
            accounts = accounts.len(),
            manual_sync,
            "Connection healthy, account syncs dispatched"
        );
        Ok(SyncConnectionOutcome {
            status: SyncStatus::Success,
            connection_status: connection.status,
            accounts_synced: accounts.len(),
        })
    }

    /// Persist the failure status, logging anything that goes wrong here
    async fn record_failure(&self, connection: &mut BankConnection, error: &Error) {
        let now = Utc::now();
        let status = ConnectionStatus::from_failure(error);
        if let Err(refused) = connection.transition_to(status, now) {
            warn!(connection_id = %connection.id, error = %refused, "Keeping current status");
        }
        connection.error_message = Some(error.to_string());
        connection.last_checked_at = Some(now);

        if let Err(e) = self.store.update_connection(connection).await {
            tracing::error!(connection_id = %connection.id, error = %e, "Failed to record sync failure");
        }
        warn!(connection_id = %connection.id, status = %connection.status, error = %error, "Connection sync failed");
    }

    /// Dispatch an automatic sync for every syncable connection
    pub async fn sync_all(&self) -> Result<usize> {
        let connections: Vec<_> = self
            .store
            .list_connections()
            .await?
            .into_iter()
            .filter(BankConnection::is_syncable)
            .collect();

        for connection in &connections {
            self.queue
                .schedule(
                    Job::SyncConnection {
                        connection_id: connection.id,
                        manual_sync: false,
                    },
                    Duration::ZERO,
                )
                .await?;
        }
        info!(count = connections.len(), "Dispatched scheduled syncs");
        Ok(connections.len())
    }
}

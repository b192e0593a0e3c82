//! Connection recovery - re-check a failed connection with bounded backoff
//!
//! Each attempt either restores the connection, schedules the next attempt
//! `2^retry_count * base` later, or, once the retry budget is spent, sends
//! a single `connection_failed` notification.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RecoverySettings;
use crate::domain::activity::CONNECTION_RECOVERED;
use crate::domain::result::{Error, Result};
use crate::domain::{ConnectionStatus, Job, Provider, UserActivity};
use crate::ports::{ConnectionStore, JobQueue, ProviderRegistry};
use crate::services::notification;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    /// The attempt was handled; false only when recovery was abandoned
    pub success: bool,
    /// The connection is usable again
    pub recovered: bool,
    pub scheduled: bool,
    pub max_retries_exceeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_in_secs: Option<u64>,
}

pub struct RecoveryService {
    store: Arc<dyn ConnectionStore>,
    providers: ProviderRegistry,
    queue: Arc<dyn JobQueue>,
    settings: RecoverySettings,
}

impl RecoveryService {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        queue: Arc<dyn JobQueue>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            store,
            providers,
            queue,
            settings,
        }
    }

    pub async fn recover_connection(
        &self,
        connection_id: Uuid,
        provider: Provider,
        retry_count: u32,
    ) -> Result<RecoveryOutcome> {
        let mut connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;

        if !connection.is_syncable() {
            info!(%connection_id, "Connection disabled, recovery abandoned");
            return Ok(RecoveryOutcome::default());
        }

        let client = self.providers.get(provider)?;
        let failure = match client.get_item_details(&connection.access_token).await {
            Ok(item) => item.error.map(Error::Provider),
            Err(e) => Some(e),
        };
        let now = Utc::now();
        connection.last_checked_at = Some(now);

        let Some(failure) = failure else {
            connection.transition_to(ConnectionStatus::Active, now)?;
            connection.error_message = None;
            self.store.update_connection(&connection).await?;

            self.queue
                .schedule(
                    Job::SyncConnection {
                        connection_id,
                        manual_sync: false,
                    },
                    Duration::ZERO,
                )
                .await?;
            self.store
                .append_activity(&UserActivity::new(
                    connection.user_id,
                    CONNECTION_RECOVERED,
                    format!("Connection to {} restored", connection.display_name()),
                    json!({ "connectionId": connection_id, "retryCount": retry_count }),
                ))
                .await?;

            info!(%connection_id, retry_count, "Connection recovered");
            return Ok(RecoveryOutcome {
                success: true,
                recovered: true,
                ..RecoveryOutcome::default()
            });
        };

        let status = ConnectionStatus::from_failure(&failure);
        if let Err(refused) = connection.transition_to(status, now) {
            warn!(%connection_id, error = %refused, "Keeping current status");
        }
        connection.error_message = Some(failure.to_string());
        self.store.update_connection(&connection).await?;

        if retry_count < self.settings.max_retries {
            let delay = self.settings.delay_for(retry_count);
            self.queue
                .schedule(
                    Job::ConnectionRecovery {
                        connection_id,
                        provider,
                        retry_count: retry_count + 1,
                    },
                    delay,
                )
                .await?;
            info!(%connection_id, retry_count, delay_secs = delay.as_secs(), "Recovery retry scheduled");
            return Ok(RecoveryOutcome {
                success: true,
                scheduled: true,
                next_attempt_in_secs: Some(delay.as_secs()),
                ..RecoveryOutcome::default()
            });
        }

        self.queue
            .schedule(
                Job::ConnectionNotification(notification::connection_failed(&connection)),
                Duration::ZERO,
            )
            .await?;
        warn!(%connection_id, retry_count, error = %failure, "Recovery retries exhausted");
        Ok(RecoveryOutcome {
            success: true,
            max_retries_exceeded: true,
            ..RecoveryOutcome::default()
        })
    }
}

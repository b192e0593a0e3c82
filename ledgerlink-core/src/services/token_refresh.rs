//! Access token refresh
//!
//! Drives the REFRESHING branch of the connection state machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::result::{Error, ErrorKind, Result};
use crate::domain::{ConnectionStatus, Job};
use crate::ports::{ConnectionStore, JobQueue, ProviderRegistry};
use crate::services::notification;

#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub refreshed: bool,
    pub status: ConnectionStatus,
}

pub struct TokenRefreshService {
    store: Arc<dyn ConnectionStore>,
    providers: ProviderRegistry,
    queue: Arc<dyn JobQueue>,
}

impl TokenRefreshService {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            store,
            providers,
            queue,
        }
    }

    pub async fn refresh_connection(&self, connection_id: Uuid) -> Result<RefreshOutcome> {
        let mut connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;
        if connection.disabled {
            return Err(Error::validation(format!(
                "Connection {} is disabled",
                connection_id
            )));
        }

        let client = self.providers.get(connection.provider)?;
        connection.transition_to(ConnectionStatus::Refreshing, Utc::now())?;
        self.store.update_connection(&connection).await?;

        match client.refresh_access_token(&connection).await {
            Ok(tokens) => {
                connection.access_token = tokens.access_token;
                if tokens.refresh_token.is_some() {
                    connection.refresh_token = tokens.refresh_token;
                }
                if tokens.expires_at.is_some() {
                    connection.expires_at = tokens.expires_at;
                }
                connection.transition_to(ConnectionStatus::Active, Utc::now())?;
                connection.error_message = None;
                self.store.update_connection(&connection).await?;

                info!(%connection_id, "Access token refreshed");
                Ok(RefreshOutcome {
                    refreshed: true,
                    status: connection.status,
                })
            }
            Err(e) => {
                let next = if e.kind() == ErrorKind::ProviderAuthExpired {
                    ConnectionStatus::RequiresReauth
                } else {
                    ConnectionStatus::RefreshFailed
                };
                connection.transition_to(next, Utc::now())?;
                connection.error_message = Some(e.to_string());
                self.store.update_connection(&connection).await?;

                self.queue
                    .schedule(
                        Job::ConnectionNotification(notification::refresh_failed(&connection)),
                        Duration::ZERO,
                    )
                    .await?;

                warn!(%connection_id, status = %next, error = %e, "Token refresh failed");
                Ok(RefreshOutcome {
                    refreshed: false,
                    status: next,
                })
            }
        }
    }
}

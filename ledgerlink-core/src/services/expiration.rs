//! Expiration and disconnection sweeps
//!
//! The decision for each connection is a pure function of the connection,
//! the thresholds and the current time. The sweeps apply those decisions,
//! and only in production.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{Environment, Thresholds};
use crate::domain::activity::CONNECTION_DISABLED;
use crate::domain::result::Result;
use crate::domain::{AccountStatus, BankConnection, ConnectionStatus, Job, Notification, UserActivity};
use crate::ports::{ConnectionStore, JobQueue};
use crate::services::notification;

/// What the expiring sweep found for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "finding")]
pub enum ExpiryFinding {
    /// Provider-side expiry has passed
    Expired,
    ExpiringCritical { days_until_expiry: i64 },
    ExpiringSoon { days_until_expiry: i64 },
    /// Inactive past the expiry threshold
    Inactive { days_inactive: i64 },
    InactivityWarning { days_inactive: i64, days_until_expiry: i64 },
}

impl ExpiryFinding {
    /// Status the connection moves to, if any
    pub fn status_change(&self) -> Option<ConnectionStatus> {
        match self {
            Self::Expired => Some(ConnectionStatus::RequiresReauth),
            Self::Inactive { .. } => Some(ConnectionStatus::RequiresAttention),
            _ => None,
        }
    }

    fn notification(&self, connection: &BankConnection) -> Notification {
        match *self {
            Self::Expired => notification::connection_expired(connection),
            Self::ExpiringCritical { days_until_expiry } => {
                notification::expiring(connection, days_until_expiry, true)
            }
            Self::ExpiringSoon { days_until_expiry } => {
                notification::expiring(connection, days_until_expiry, false)
            }
            Self::Inactive { days_inactive } => {
                notification::connection_inactive(connection, days_inactive)
            }
            Self::InactivityWarning {
                days_inactive,
                days_until_expiry,
            } => notification::inactivity_warning(connection, days_inactive, days_until_expiry),
        }
    }
}

/// Evaluate one connection for the expiring sweep
pub fn evaluate_expiry(
    connection: &BankConnection,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Option<ExpiryFinding> {
    if let Some(expires_at) = connection.expires_at {
        if expires_at <= now {
            return Some(ExpiryFinding::Expired);
        }
        let remaining = expires_at - now;
        let days_until_expiry = remaining.num_days();
        if remaining <= Duration::days(thresholds.expiry_critical_window_days) {
            return Some(ExpiryFinding::ExpiringCritical { days_until_expiry });
        }
        if remaining <= Duration::days(thresholds.expiry_warning_window_days) {
            return Some(ExpiryFinding::ExpiringSoon { days_until_expiry });
        }
    }

    let days_inactive = (now - connection.last_activity_at()).num_days();
    if days_inactive >= thresholds.inactivity_expiry_days {
        return Some(ExpiryFinding::Inactive { days_inactive });
    }
    if days_inactive >= thresholds.expiry_warning_days_inactive {
        return Some(ExpiryFinding::InactivityWarning {
            days_inactive,
            days_until_expiry: thresholds.inactivity_expiry_days - days_inactive,
        });
    }
    None
}

/// No expiry notification within the cooldown
pub fn expiry_notification_due(
    connection: &BankConnection,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> bool {
    connection.last_expiry_notified_at.map_or(true, |at| {
        now - at >= Duration::days(thresholds.expiry_notification_cooldown_days)
    })
}

/// What the disconnected sweep does with one broken connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum DisconnectedAction {
    AutoDisable { days_unresolved: i64 },
    Notify { days_unresolved: i64, critical: bool },
    Wait,
}

pub fn evaluate_disconnected(
    connection: &BankConnection,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> DisconnectedAction {
    let days_unresolved = (now - connection.status_changed_at).num_days();

    if connection.notification_count >= thresholds.auto_disable_after_notifications
        && days_unresolved >= thresholds.auto_disable_after_days
    {
        return DisconnectedAction::AutoDisable { days_unresolved };
    }

    let due = connection.last_notified_at.map_or(true, |at| {
        now - at >= Duration::days(thresholds.disconnected_notification_cooldown_days)
    });
    if !due {
        return DisconnectedAction::Wait;
    }

    let critical = days_unresolved >= thresholds.critical_after_days
        || connection.notification_count >= thresholds.critical_after_notifications;
    DisconnectedAction::Notify {
        days_unresolved,
        critical,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Not production, nothing examined
    pub skipped_environment: bool,
    pub examined: usize,
    pub notified: usize,
    pub status_changes: usize,
    pub disabled: usize,
}

pub struct ExpirationService {
    store: Arc<dyn ConnectionStore>,
    queue: Arc<dyn JobQueue>,
    thresholds: Thresholds,
    environment: Environment,
}

impl ExpirationService {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        queue: Arc<dyn JobQueue>,
        thresholds: Thresholds,
        environment: Environment,
    ) -> Self {
        Self {
            store,
            queue,
            thresholds,
            environment,
        }
    }

    fn skipped(&self, sweep: &str) -> Option<SweepReport> {
        if self.environment.is_production() {
            return None;
        }
        info!(sweep, environment = %self.environment, "Sweep skipped outside production");
        Some(SweepReport {
            skipped_environment: true,
            ..SweepReport::default()
        })
    }

    async fn notify(&self, notification: Notification) -> Result<()> {
        self.queue
            .schedule(Job::ConnectionNotification(notification), StdDuration::ZERO)
            .await
    }

    /// Warn about expiring or inactive connections
    pub async fn sweep_expiring(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        if let Some(report) = self.skipped("expiring") {
            return Ok(report);
        }

        let mut report = SweepReport::default();
        let connections = self.store.list_connections().await?;

        for mut connection in connections.into_iter().filter(BankConnection::is_syncable) {
            report.examined += 1;
            let Some(finding) = evaluate_expiry(&connection, &self.thresholds, now) else {
                continue;
            };

            let mut changed = false;
            if let Some(next) = finding.status_change() {
                if connection.status != next {
                    match connection.transition_to(next, now) {
                        Ok(()) => {
                            changed = true;
                            report.status_changes += 1;
                        }
                        Err(refused) => {
                            warn!(connection_id = %connection.id, error = %refused, "Expiry status not applied")
                        }
                    }
                }
            }

            if expiry_notification_due(&connection, &self.thresholds, now) {
                self.notify(finding.notification(&connection)).await?;
                connection.last_expiry_notified_at = Some(now);
                connection.expiry_notification_count += 1;
                changed = true;
                report.notified += 1;
            } else {
                debug!(connection_id = %connection.id, "Expiry notification on cooldown");
            }

            if changed {
                self.store.update_connection(&connection).await?;
            }
        }

        info!(
            examined = report.examined,
            notified = report.notified,
            status_changes = report.status_changes,
            "Expiring sweep finished"
        );
        Ok(report)
    }

    /// Remind about broken connections and disable abandoned ones
    pub async fn sweep_disconnected(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        if let Some(report) = self.skipped("disconnected") {
            return Ok(report);
        }

        let mut report = SweepReport::default();
        let connections = self.store.list_connections().await?;

        for mut connection in connections
            .into_iter()
            .filter(|c| !c.disabled && c.status.is_unresolved())
        {
            report.examined += 1;
            match evaluate_disconnected(&connection, &self.thresholds, now) {
                DisconnectedAction::AutoDisable { days_unresolved } => {
                    self.auto_disable(&mut connection, days_unresolved, now).await?;
                    report.disabled += 1;
                    report.status_changes += 1;
                    report.notified += 1;
                }
                DisconnectedAction::Notify {
                    days_unresolved,
                    critical,
                } => {
                    self.notify(notification::connection_issue(&connection, days_unresolved, critical))
                        .await?;
                    connection.notification_count += 1;
                    connection.last_notified_at = Some(now);
                    if critical {
                        connection.alert_count += 1;
                    }
                    self.store.update_connection(&connection).await?;
                    report.notified += 1;
                }
                DisconnectedAction::Wait => {}
            }
        }

        info!(
            examined = report.examined,
            notified = report.notified,
            disabled = report.disabled,
            "Disconnected sweep finished"
        );
        Ok(report)
    }

    async fn auto_disable(
        &self,
        connection: &mut BankConnection,
        days_unresolved: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        connection.transition_to(ConnectionStatus::Disconnected, now)?;
        connection.disabled = true;
        connection.last_notified_at = Some(now);
        self.store.update_connection(connection).await?;

        for mut account in self.store.list_accounts(connection.id).await? {
            account.status = AccountStatus::Disconnected;
            account.enabled = false;
            account.updated_at = now;
            self.store.update_account(&account).await?;
        }

        self.store
            .append_activity(&UserActivity::new(
                connection.user_id,
                CONNECTION_DISABLED,
                format!("Connection to {} disabled", connection.display_name()),
                json!({
                    "connectionId": connection.id,
                    "daysUnresolved": days_unresolved,
                    "notificationCount": connection.notification_count,
                }),
            ))
            .await?;
        self.notify(notification::connection_disabled(connection, days_unresolved))
            .await?;

        warn!(connection_id = %connection.id, days_unresolved, "Connection auto-disabled");
        Ok(())
    }
}

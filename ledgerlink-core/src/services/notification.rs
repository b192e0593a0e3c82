//! Notification service and the user-facing notification texts
//!
//! Titles and messages name the institution, never a provider error code.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{BankConnection, Notification, NotificationType, UserActivity};
use crate::ports::{ConnectionStore, Notifier};

pub struct NotificationService {
    store: Arc<dyn ConnectionStore>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn ConnectionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Hand a notification to the notifier and record it in the user's activity
    pub async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.notifier.send(notification).await?;

        let activity = UserActivity::new(
            notification.user_id,
            notification.notification_type.as_str(),
            notification.title.clone(),
            notification.data.clone(),
        );
        self.store.append_activity(&activity).await?;

        info!(
            user_id = %notification.user_id,
            kind = %notification.notification_type,
            notifier = self.notifier.name(),
            "Notification delivered"
        );
        Ok(())
    }

    /// Notify about transactions stored since `since`, if there are any
    pub async fn notify_new_transactions(
        &self,
        connection_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;
        let account_ids: Vec<Uuid> = self
            .store
            .list_accounts(connection_id)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();

        let count = self
            .store
            .count_transactions_created_since(&account_ids, since)
            .await?;
        if count > 0 {
            self.deliver(&transactions_new(&connection, count)).await?;
        }
        Ok(count)
    }
}

fn plural(n: i64, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn connection_data(connection: &BankConnection) -> serde_json::Value {
    json!({
        "connectionId": connection.id,
        "institutionName": connection.display_name(),
    })
}

pub fn connection_failed(connection: &BankConnection) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::ConnectionFailed,
        "Bank Connection Failed",
        format!(
            "We couldn't reconnect to {}. Please reconnect your account to resume syncing.",
            connection.display_name()
        ),
    )
    .with_data(connection_data(connection))
}

pub fn refresh_failed(connection: &BankConnection) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::ConnectionRefreshFailed,
        "Bank Connection Needs Attention",
        format!(
            "We couldn't renew access to {}. Please reconnect your account.",
            connection.display_name()
        ),
    )
    .with_data(connection_data(connection))
}

pub fn connection_expired(connection: &BankConnection) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::ConnectionExpired,
        "Bank Connection Expired",
        format!(
            "Your connection to {} has expired. Reconnect to keep your accounts up to date.",
            connection.display_name()
        ),
    )
    .with_data(connection_data(connection))
}

pub fn connection_inactive(connection: &BankConnection, days_inactive: i64) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::ConnectionExpired,
        "Bank Connection Expired",
        format!(
            "Your connection to {} expired after {} without activity. Reconnect to resume syncing.",
            connection.display_name(),
            plural(days_inactive, "day")
        ),
    )
    .with_data(json!({
        "connectionId": connection.id,
        "institutionName": connection.display_name(),
        "daysInactive": days_inactive,
    }))
}

/// Provider-side expiry approaching
pub fn expiring(connection: &BankConnection, days_until_expiry: i64, critical: bool) -> Notification {
    let (kind, title) = if critical {
        (NotificationType::ConnectionCritical, "Bank Connection Expires Very Soon")
    } else {
        (NotificationType::ConnectionWarning, "Bank Connection Expiring Soon")
    };
    Notification::new(
        connection.user_id,
        kind,
        title,
        format!(
            "Access to {} expires in {}. Reconnect to avoid interruptions.",
            connection.display_name(),
            plural(days_until_expiry, "day")
        ),
    )
    .with_data(json!({
        "connectionId": connection.id,
        "institutionName": connection.display_name(),
        "daysUntilExpiry": days_until_expiry,
    }))
}

/// Inactivity approaching the expiry threshold
pub fn inactivity_warning(
    connection: &BankConnection,
    days_inactive: i64,
    days_until_expiry: i64,
) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::ConnectionWarning,
        "Bank Connection Expiring Soon",
        format!(
            "Your connection to {} will expire in {} unless you open the app.",
            connection.display_name(),
            plural(days_until_expiry, "day")
        ),
    )
    .with_data(json!({
        "connectionId": connection.id,
        "institutionName": connection.display_name(),
        "daysInactive": days_inactive,
        "daysUntilExpiry": days_until_expiry,
    }))
}

/// Reminder about a connection stuck in a broken state
pub fn connection_issue(connection: &BankConnection, days_unresolved: i64, critical: bool) -> Notification {
    let (kind, title, message) = if critical {
        (
            NotificationType::ConnectionCritical,
            "Bank Connection Still Broken",
            format!(
                "Your connection to {} has not synced for {}. Reconnect now to avoid it being disabled.",
                connection.display_name(),
                plural(days_unresolved, "day")
            ),
        )
    } else {
        (
            NotificationType::ConnectionWarning,
            "Bank Connection Needs Attention",
            format!(
                "Your connection to {} needs attention. Reconnect to resume syncing.",
                connection.display_name()
            ),
        )
    };
    Notification::new(connection.user_id, kind, title, message).with_data(json!({
        "connectionId": connection.id,
        "institutionName": connection.display_name(),
        "daysUnresolved": days_unresolved,
        "status": connection.status,
    }))
}

pub fn connection_disabled(connection: &BankConnection, days_unresolved: i64) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::ConnectionCritical,
        "Bank Connection Disabled",
        format!(
            "Your connection to {} was disabled after {} without a fix. Reconnect to start syncing again.",
            connection.display_name(),
            plural(days_unresolved, "day")
        ),
    )
    .with_data(json!({
        "connectionId": connection.id,
        "institutionName": connection.display_name(),
        "daysUnresolved": days_unresolved,
    }))
}

pub fn transactions_new(connection: &BankConnection, count: u64) -> Notification {
    Notification::new(
        connection.user_id,
        NotificationType::TransactionsNew,
        "New Transactions",
        format!(
            "{} from {}.",
            plural(count as i64, "new transaction"),
            connection.display_name()
        ),
    )
    .with_data(json!({
        "connectionId": connection.id,
        "count": count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionStatus, Provider};

    fn connection() -> BankConnection {
        let mut c = BankConnection::new(Uuid::new_v4(), Provider::Plaid, "access-sandbox-1");
        c.institution_name = Some("Chase".to_string());
        c.status = ConnectionStatus::LoginRequired;
        c.error_message = Some("ITEM_LOGIN_REQUIRED".to_string());
        c
    }

    #[test]
    fn test_texts_never_carry_provider_codes() {
        let c = connection();
        let all = [
            connection_failed(&c),
            refresh_failed(&c),
            connection_expired(&c),
            connection_inactive(&c, 31),
            expiring(&c, 2, true),
            inactivity_warning(&c, 25, 5),
            connection_issue(&c, 8, true),
            connection_disabled(&c, 30),
        ];
        for n in all {
            assert!(!n.title.contains("ITEM_"), "{}", n.title);
            assert!(!n.message.contains("ITEM_"), "{}", n.message);
            assert!(n.message.contains("Chase"));
            assert_eq!(n.user_id, c.user_id);
        }
    }

    #[test]
    fn test_inactivity_warning_payload() {
        let c = connection();
        let n = inactivity_warning(&c, 25, 5);
        assert_eq!(n.notification_type, NotificationType::ConnectionWarning);
        assert_eq!(n.title, "Bank Connection Expiring Soon");
        assert_eq!(n.data["daysUntilExpiry"], json!(5));
        assert!(n.message.contains("5 days"));
    }

    #[test]
    fn test_issue_escalation_type() {
        let c = connection();
        assert_eq!(
            connection_issue(&c, 2, false).notification_type,
            NotificationType::ConnectionWarning
        );
        assert_eq!(
            connection_issue(&c, 9, true).notification_type,
            NotificationType::ConnectionCritical
        );
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "day"), "1 day");
        assert_eq!(plural(3, "new transaction"), "3 new transactions");
    }
}

//! User-facing notification payloads

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ConnectionCritical,
    ConnectionWarning,
    ConnectionExpired,
    ConnectionFailed,
    ConnectionRefreshFailed,
    TransactionsNew,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionCritical => "connection_critical",
            Self::ConnectionWarning => "connection_warning",
            Self::ConnectionExpired => "connection_expired",
            Self::ConnectionFailed => "connection_failed",
            Self::ConnectionRefreshFailed => "connection_refresh_failed",
            Self::TransactionsNew => "transactions_new",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to the notification collaborator
///
/// Titles and messages are short human-readable text. Raw provider error
/// codes never appear in them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

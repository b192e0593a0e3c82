//! Bank connection domain model and status state machine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, ErrorKind, ProviderError, Result};

/// Third-party banking data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Plaid,
    Teller,
    GoCardless,
    Stripe,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Plaid => "plaid",
            Provider::Teller => "teller",
            Provider::GoCardless => "gocardless",
            Provider::Stripe => "stripe",
        }
    }

    /// Whether this provider reports expenses as positive amounts
    ///
    /// Plaid uses positive = money out. Teller, GoCardless and Stripe use
    /// positive = money in, so their amounts are negated on import.
    pub fn expenses_are_positive(&self) -> bool {
        matches!(self, Provider::Plaid)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "plaid" => Ok(Provider::Plaid),
            "teller" => Ok(Provider::Teller),
            "gocardless" => Ok(Provider::GoCardless),
            "stripe" => Ok(Provider::Stripe),
            other => Err(Error::validation(format!("Unknown provider: {}", other))),
        }
    }
}

/// Connection status
///
/// Transitions are guarded by [`ConnectionStatus::can_transition_to`].
/// `Disconnected` is terminal: only a fresh user-initiated reconnect, which
/// creates a new connection, gets out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Active,
    Error,
    LoginRequired,
    RequiresReauth,
    RequiresAttention,
    Refreshing,
    RefreshFailed,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
            Self::LoginRequired => "LOGIN_REQUIRED",
            Self::RequiresReauth => "REQUIRES_REAUTH",
            Self::RequiresAttention => "REQUIRES_ATTENTION",
            Self::Refreshing => "REFRESHING",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::Disconnected => "DISCONNECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// States the disconnected sweep looks at
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::Error | Self::LoginRequired | Self::RequiresAttention
        )
    }

    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        use ConnectionStatus as S;

        if *self == next {
            return true;
        }

        match (*self, next) {
            (S::Disconnected, _) => false,
            (_, S::Active) => true,
            (S::Active | S::Error | S::LoginRequired, S::Refreshing) => true,
            (S::Refreshing, S::RefreshFailed | S::RequiresReauth) => true,
            (S::Refreshing, _) => false,
            (S::Error | S::LoginRequired | S::RequiresAttention, S::Disconnected) => true,
            (_, S::Disconnected | S::Refreshing | S::RefreshFailed) => false,
            (_, S::Error | S::LoginRequired | S::RequiresAttention | S::RequiresReauth) => true,
        }
    }

    /// Status that a failed provider check or sync leaves behind
    ///
    /// Login-required style provider errors always map to `LoginRequired`;
    /// everything else is a generic `Error`.
    pub fn from_failure(error: &Error) -> Self {
        match error.kind() {
            ErrorKind::ProviderAuthExpired => Self::LoginRequired,
            _ => Self::Error,
        }
    }

    /// Status for the error a provider reports on an otherwise readable item
    pub fn from_item_error(error: Option<&ProviderError>) -> Self {
        match error {
            None => Self::Active,
            Some(e) if e.code.is_auth_expired() => Self::LoginRequired,
            Some(_) => Self::Error,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "ERROR" => Ok(Self::Error),
            "LOGIN_REQUIRED" => Ok(Self::LoginRequired),
            "REQUIRES_REAUTH" => Ok(Self::RequiresReauth),
            "REQUIRES_ATTENTION" => Ok(Self::RequiresAttention),
            "REFRESHING" => Ok(Self::Refreshing),
            "REFRESH_FAILED" => Ok(Self::RefreshFailed),
            "DISCONNECTED" => Ok(Self::Disconnected),
            other => Err(Error::validation(format!("Unknown connection status: {}", other))),
        }
    }
}

/// A link to one financial institution for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub status: ConnectionStatus,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub last_expiry_notified_at: Option<DateTime<Utc>>,
    /// When `status` last changed value
    pub status_changed_at: DateTime<Utc>,
    pub notification_count: i32,
    pub expiry_notification_count: i32,
    pub alert_count: i32,
    pub disabled: bool,
}

impl BankConnection {
    /// Create a new active connection
    pub fn new(user_id: Uuid, provider: Provider, access_token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider,
            access_token: access_token.into(),
            refresh_token: None,
            status: ConnectionStatus::Active,
            institution_id: None,
            institution_name: None,
            error_message: None,
            created_at: now,
            last_accessed_at: Some(now),
            last_checked_at: None,
            last_synced_at: None,
            expires_at: None,
            last_notified_at: None,
            last_expiry_notified_at: None,
            status_changed_at: now,
            notification_count: 0,
            expiry_notification_count: 0,
            alert_count: 0,
            disabled: false,
        }
    }

    /// Whether sync jobs may run against this connection
    pub fn is_syncable(&self) -> bool {
        !self.disabled && !self.status.is_terminal()
    }

    /// Move to `next`, enforcing the state machine
    pub fn transition_to(&mut self, next: ConnectionStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if self.status != next {
            self.status_changed_at = now;
        }
        self.status = next;
        Ok(())
    }

    /// Display name for notifications
    pub fn display_name(&self) -> &str {
        self.institution_name.as_deref().unwrap_or("your bank")
    }

    /// Timestamp inactivity is measured from
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }
}

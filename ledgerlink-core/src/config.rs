//! Configuration management
//!
//! Settings live in `<data_dir>/settings.json`:
//! ```json
//! {
//!   "environment": "production",
//!   "plaid": { "clientId": "...", "secret": "...", "baseUrl": "https://production.plaid.com" },
//!   "notifications": { "webhookUrl": "https://..." },
//!   "thresholds": { "expiryWarningDaysInactive": 20, ... },
//!   "sync": { "manualStaggerSecs": 2, ... },
//!   "recovery": { "maxRetries": 3, "baseDelayMinutes": 15 },
//!   "schedule": { "expiringSweep": "0 0 9 * * *", ... }
//! }
//! ```
//! Every key is optional. Environment variables override the file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::plaid::PLAID_SANDBOX_URL;
use crate::domain::result::{Error, Result};

pub const DATA_DIR_ENV: &str = "LEDGERLINK_DIR";
pub const ENVIRONMENT_ENV: &str = "LEDGERLINK_ENV";
pub const PLAID_CLIENT_ID_ENV: &str = "PLAID_CLIENT_ID";
pub const PLAID_SECRET_ENV: &str = "PLAID_SECRET";
pub const PLAID_BASE_URL_ENV: &str = "PLAID_BASE_URL";
pub const NOTIFY_WEBHOOK_ENV: &str = "LEDGERLINK_NOTIFY_WEBHOOK";

const SETTINGS_FILE: &str = "settings.json";

/// Resolve the data directory: `LEDGERLINK_DIR`, else `~/.ledgerlink`
pub fn data_dir() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ledgerlink")
        })
}

/// Deployment environment
///
/// Expiration and disconnection sweeps only act in `Production`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        };
        f.write_str(s)
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(Error::config(format!("Unknown environment: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaidSettings {
    pub client_id: Option<String>,
    pub secret: Option<String>,
    pub base_url: Option<String>,
}

impl PlaidSettings {
    pub fn is_configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(PLAID_SANDBOX_URL)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
}

/// Business thresholds for the expiration and disconnection sweeps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    /// Inactivity after which an expiry warning is sent
    pub expiry_warning_days_inactive: i64,
    /// Inactivity after which the connection is considered expired
    pub inactivity_expiry_days: i64,
    /// Minimum gap between expiry notifications
    pub expiry_notification_cooldown_days: i64,
    /// Minimum gap between notifications about a broken connection
    pub disconnected_notification_cooldown_days: i64,
    /// A broken connection is auto-disabled once unresolved this long...
    pub auto_disable_after_days: i64,
    /// ...and after at least this many notifications
    pub auto_disable_after_notifications: i32,
    /// Provider expiry within this many days gets a warning
    pub expiry_warning_window_days: i64,
    /// Provider expiry within this many days gets a critical notice
    pub expiry_critical_window_days: i64,
    /// Broken this long, notifications escalate to critical
    pub critical_after_days: i64,
    /// Notified this many times, notifications escalate to critical
    pub critical_after_notifications: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            expiry_warning_days_inactive: 20,
            inactivity_expiry_days: 30,
            expiry_notification_cooldown_days: 7,
            disconnected_notification_cooldown_days: 3,
            auto_disable_after_days: 30,
            auto_disable_after_notifications: 5,
            expiry_warning_window_days: 14,
            expiry_critical_window_days: 3,
            critical_after_days: 7,
            critical_after_notifications: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    /// Delay between account syncs of one connection, manual sync
    pub manual_stagger_secs: u64,
    /// Delay between account syncs of one connection, automatic sync
    pub auto_stagger_secs: u64,
    /// Delay before the new-transactions notification after a manual sync
    pub notification_delay_secs: u64,
    /// Days of history fetched per transaction upsert
    pub lookback_days: i64,
    /// Also fetch transactions on automatic account syncs
    pub transactions_on_auto_sync: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            manual_stagger_secs: 2,
            auto_stagger_secs: 30,
            notification_delay_secs: 120,
            lookback_days: 90,
            transactions_on_auto_sync: false,
        }
    }
}

impl SyncSettings {
    pub fn stagger(&self, manual_sync: bool) -> Duration {
        Duration::from_secs(if manual_sync {
            self.manual_stagger_secs
        } else {
            self.auto_stagger_secs
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecoverySettings {
    pub max_retries: u32,
    pub base_delay_minutes: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_minutes: 15,
        }
    }
}

impl RecoverySettings {
    /// `2^retry_count * base` (15, 30, 60 minutes with defaults)
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry_count);
        Duration::from_secs(self.base_delay_minutes.saturating_mul(60).saturating_mul(factor))
    }
}

/// Cron expressions (seconds-first, as tokio-cron-scheduler expects)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleSettings {
    pub expiring_sweep: String,
    pub disconnected_sweep: String,
    pub sync_all: String,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            expiring_sweep: "0 0 9 * * *".to_string(),
            disconnected_sweep: "0 30 9 * * *".to_string(),
            sync_all: "0 0 */6 * * *".to_string(),
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    environment: Environment,
    #[serde(default)]
    plaid: PlaidSettings,
    #[serde(default)]
    notifications: NotificationSettings,
    #[serde(default)]
    thresholds: Thresholds,
    #[serde(default)]
    sync: SyncSettings,
    #[serde(default)]
    recovery: RecoverySettings,
    #[serde(default)]
    schedule: ScheduleSettings,
    /// Keys this version does not manage, preserved on save
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ledgerlink configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub environment: Environment,
    pub plaid: PlaidSettings,
    pub notifications: NotificationSettings,
    pub thresholds: Thresholds,
    pub sync: SyncSettings,
    pub recovery: RecoverySettings,
    pub schedule: ScheduleSettings,
}

impl Config {
    /// Load settings.json from `data_dir`, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::from_file(data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load settings.json only
    pub fn from_file(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(&data_dir.join(SETTINGS_FILE))?;
        Ok(Self {
            environment: raw.environment,
            plaid: raw.plaid,
            notifications: raw.notifications,
            thresholds: raw.thresholds,
            sync: raw.sync,
            recovery: raw.recovery,
            schedule: raw.schedule,
        })
    }

    /// Apply overrides from a variable lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup(ENVIRONMENT_ENV) {
            match env.parse() {
                Ok(parsed) => self.environment = parsed,
                Err(e) => tracing::warn!(error = %e, "Ignoring {}", ENVIRONMENT_ENV),
            }
        }
        if let Some(v) = lookup(PLAID_CLIENT_ID_ENV) {
            self.plaid.client_id = Some(v);
        }
        if let Some(v) = lookup(PLAID_SECRET_ENV) {
            self.plaid.secret = Some(v);
        }
        if let Some(v) = lookup(PLAID_BASE_URL_ENV) {
            self.plaid.base_url = Some(v);
        }
        if let Some(v) = lookup(NOTIFY_WEBHOOK_ENV) {
            self.notifications.webhook_url = Some(v);
        }
    }

    /// Write tunable sections back to settings.json
    ///
    /// Credentials and the webhook are left as they are in the file, so
    /// values supplied through the environment are never persisted.
    /// Unknown keys are preserved.
    pub fn save(&self, data_dir: &Path) -> Result<PathBuf> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        let mut settings = read_settings(&settings_path)?;

        settings.thresholds = self.thresholds.clone();
        settings.sync = self.sync.clone();
        settings.recovery = self.recovery.clone();
        settings.schedule = self.schedule.clone();

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(settings_path)
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("Invalid {}: {}", path.display(), e)))
}

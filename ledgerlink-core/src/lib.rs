//! Ledgerlink Core - bank-connection synchronization and recovery
//!
//! This crate follows a hexagonal architecture:
//!
//! - **domain**: Entities, the connection state machine, job payloads, errors
//! - **ports**: Traits for external dependencies (store, providers, queue, notifier)
//! - **services**: One service per job type, plus the job runner and cron
//! - **adapters**: Concrete implementations (DuckDB, Plaid, tokio queue, webhook)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adapters::duckdb::DuckDbStore;
use adapters::notifier::{LogNotifier, WebhookNotifier};
use adapters::plaid::PlaidClient;
use config::Config;
use ports::{ConnectionStore, JobQueue, Notifier, ProviderRegistry};
use services::{JobRunner, SetupService};

pub use domain::result::{Error, OperationResult, Result};
pub use domain::{
    AccountStatus, BankAccount, BankConnection, ConnectionStatus, Job, JobEnvelope, Notification,
    NotificationType, Provider, Transaction,
};

pub const DATABASE_FILE: &str = "ledgerlink.duckdb";

/// Wiring for the store, provider clients and notifier
///
/// Everything is passed explicitly, so tests build a context from fakes
/// with [`LedgerlinkContext::from_parts`].
pub struct LedgerlinkContext {
    pub config: Config,
    pub store: Arc<dyn ConnectionStore>,
    pub providers: ProviderRegistry,
    pub notifier: Arc<dyn Notifier>,
}

impl LedgerlinkContext {
    /// Open the database in `data_dir` and configure clients from settings
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        std::fs::create_dir_all(data_dir)?;

        let store = DuckDbStore::open(&Self::database_path(data_dir))?;
        store.ensure_schema()?;

        let mut providers = ProviderRegistry::new();
        if config.plaid.is_configured() {
            let client = PlaidClient::new(
                config.plaid.client_id.as_deref().unwrap_or_default(),
                config.plaid.secret.as_deref().unwrap_or_default(),
                config.plaid.base_url(),
            )?;
            providers.register(Arc::new(client));
        } else {
            tracing::debug!("Plaid credentials not configured");
        }

        let notifier: Arc<dyn Notifier> = match config.notifications.webhook_url.as_deref() {
            Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)?),
            _ => Arc::new(LogNotifier),
        };

        Ok(Self::from_parts(config, Arc::new(store), providers, notifier))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            providers,
            notifier,
        }
    }

    pub fn database_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DATABASE_FILE)
    }

    /// A job runner dispatching follow-up jobs onto `queue`
    pub fn runner(&self, queue: Arc<dyn JobQueue>) -> JobRunner {
        JobRunner::new(
            self.store.clone(),
            self.providers.clone(),
            queue,
            self.notifier.clone(),
            &self.config,
        )
    }

    pub fn setup(&self) -> SetupService {
        SetupService::new(self.store.clone(), self.providers.clone())
    }
}

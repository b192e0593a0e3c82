//! Shared helpers for integration tests
//!
//! Provider IO is faked at the trait level. All database operations are
//! real DuckDB in a temporary directory.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use ledgerlink_core::adapters::duckdb::DuckDbStore;
use ledgerlink_core::adapters::recording_queue::RecordingQueue;
use ledgerlink_core::config::{Config, Environment};
use ledgerlink_core::domain::{
    BankAccount, BankConnection, Notification, Provider, ProviderError, ProviderTransaction,
    Result,
};
use ledgerlink_core::ports::{
    ConnectionStore, ItemDetails, JobQueue, Notifier, ProviderAccount, ProviderClient,
    ProviderRegistry, TokenSet,
};
use ledgerlink_core::LedgerlinkContext;

// ============================================================================
// Fake provider
// ============================================================================

pub struct FakeProvider {
    provider: Provider,
    item_error: Mutex<Option<ProviderError>>,
    item_check_failure: Mutex<Option<ProviderError>>,
    accounts: Mutex<Vec<ProviderAccount>>,
    accounts_failure: Mutex<Option<ProviderError>>,
    transactions: Mutex<Vec<ProviderTransaction>>,
    refresh: Mutex<Option<std::result::Result<TokenSet, ProviderError>>>,
    item_checks: AtomicUsize,
}

impl FakeProvider {
    pub fn new(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            item_error: Mutex::new(None),
            item_check_failure: Mutex::new(None),
            accounts: Mutex::new(Vec::new()),
            accounts_failure: Mutex::new(None),
            transactions: Mutex::new(Vec::new()),
            refresh: Mutex::new(None),
            item_checks: AtomicUsize::new(0),
        })
    }

    /// Item check succeeds but reports this error on the item
    pub fn set_item_error(&self, error: Option<ProviderError>) {
        *self.item_error.lock().unwrap() = error;
    }

    /// Item check itself fails
    pub fn fail_item_check(&self, error: Option<ProviderError>) {
        *self.item_check_failure.lock().unwrap() = error;
    }

    pub fn set_accounts(&self, accounts: Vec<ProviderAccount>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn fail_accounts(&self, error: Option<ProviderError>) {
        *self.accounts_failure.lock().unwrap() = error;
    }

    pub fn set_transactions(&self, transactions: Vec<ProviderTransaction>) {
        *self.transactions.lock().unwrap() = transactions;
    }

    pub fn set_refresh(&self, result: std::result::Result<TokenSet, ProviderError>) {
        *self.refresh.lock().unwrap() = Some(result);
    }

    pub fn item_checks(&self) -> usize {
        self.item_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn get_item_details(&self, _access_token: &str) -> Result<ItemDetails> {
        self.item_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.item_check_failure.lock().unwrap().clone() {
            return Err(e.into());
        }
        Ok(ItemDetails {
            institution_id: Some("ins_1".to_string()),
            institution_name: Some("First Platypus Bank".to_string()),
            error: self.item_error.lock().unwrap().clone(),
            consent_expires_at: None,
        })
    }

    async fn get_accounts(&self, _access_token: &str) -> Result<Vec<ProviderAccount>> {
        if let Some(e) = self.accounts_failure.lock().unwrap().clone() {
            return Err(e.into());
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn get_transactions(
        &self,
        _access_token: &str,
        _connection: &BankConnection,
        account_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderTransaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| account_ids.is_empty() || account_ids.contains(&t.provider_account_id))
            .filter(|t| t.date >= start && t.date <= end)
            .cloned()
            .collect())
    }

    async fn refresh_access_token(&self, _connection: &BankConnection) -> Result<TokenSet> {
        match self.refresh.lock().unwrap().clone() {
            Some(Ok(tokens)) => Ok(tokens),
            Some(Err(e)) => Err(e.into()),
            None => Err(ProviderError::unsupported("refresh not supported").into()),
        }
    }
}

pub fn provider_account(id: &str, current_cents: i64) -> ProviderAccount {
    ProviderAccount {
        provider_account_id: id.to_string(),
        name: format!("Checking {}", id),
        official_name: None,
        account_type: Some("depository".to_string()),
        subtype: Some("checking".to_string()),
        available_balance: Some(Decimal::new(current_cents - 1000, 2)),
        current_balance: Some(Decimal::new(current_cents, 2)),
        limit: None,
        iso_currency_code: Some("usd".to_string()),
        mask: Some("0000".to_string()),
    }
}

pub fn provider_transaction(id: &str, account: &str, cents: i64) -> ProviderTransaction {
    ProviderTransaction {
        provider_transaction_id: id.to_string(),
        provider_account_id: account.to_string(),
        amount: Decimal::new(cents, 2),
        iso_currency_code: Some("usd".to_string()),
        date: Utc::now().date_naive(),
        name: format!("Purchase {}", id),
        merchant_name: Some("  Blue   Bottle  ".to_string()),
        category: Some("FOOD_AND_DRINK".to_string()),
        subcategory: None,
        pending: true,
    }
}

// ============================================================================
// Recording notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<DuckDbStore>,
    pub provider: Arc<FakeProvider>,
    pub queue: Arc<RecordingQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_environment(Environment::Development)
    }

    pub fn production() -> Self {
        Self::with_environment(Environment::Production)
    }

    fn with_environment(environment: Environment) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = DuckDbStore::open(&dir.path().join("test.duckdb")).expect("Failed to open store");
        store.ensure_schema().expect("Failed to initialize schema");

        let config = Config {
            environment,
            ..Config::default()
        };
        Self {
            dir,
            store: Arc::new(store),
            provider: FakeProvider::new(Provider::Plaid),
            queue: Arc::new(RecordingQueue::new()),
            notifier: Arc::new(RecordingNotifier::default()),
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn ConnectionStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        self.queue.clone()
    }

    pub fn providers(&self) -> ProviderRegistry {
        ProviderRegistry::new().with(self.provider.clone())
    }

    pub fn context(&self) -> LedgerlinkContext {
        LedgerlinkContext::from_parts(
            self.config.clone(),
            self.store(),
            self.providers(),
            self.notifier.clone(),
        )
    }

    /// Register a connection with `accounts` provider accounts acc_1..acc_n
    pub async fn seed_connection(&self, accounts: usize) -> (BankConnection, Vec<BankAccount>) {
        self.provider.set_accounts(
            (1..=accounts)
                .map(|i| provider_account(&format!("acc_{}", i), 100_000 + i as i64))
                .collect(),
        );
        self.context()
            .setup()
            .register_connection(
                Provider::Plaid,
                "access-sandbox-test",
                None,
                Uuid::new_v4(),
                None,
            )
            .await
            .expect("Failed to register connection")
    }

    pub async fn connection(&self, id: Uuid) -> BankConnection {
        self.store.get_connection(id).await.unwrap().expect("connection exists")
    }

    pub async fn account(&self, id: Uuid) -> BankAccount {
        self.store.get_account(id).await.unwrap().expect("account exists")
    }

    pub async fn save(&self, connection: &BankConnection) {
        self.store.update_connection(connection).await.unwrap();
    }
}

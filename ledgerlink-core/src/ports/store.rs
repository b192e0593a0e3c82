//! Connection store port - persistence for connections, accounts,
//! transactions and user activity

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{BankAccount, BankConnection, Transaction, UserActivity};

/// Row counts from a transaction upsert batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Record store abstraction
///
/// Writes are narrow single-row updates keyed by primary key, with the
/// exception of [`ConnectionStore::upsert_transactions`], which applies a
/// whole batch atomically.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    // === Connections ===

    async fn insert_connection(&self, connection: &BankConnection) -> Result<()>;

    async fn get_connection(&self, id: Uuid) -> Result<Option<BankConnection>>;

    /// All connections, disabled ones included
    async fn list_connections(&self) -> Result<Vec<BankConnection>>;

    /// Overwrite the stored row with `connection`
    async fn update_connection(&self, connection: &BankConnection) -> Result<()>;

    // === Accounts ===

    async fn insert_account(&self, account: &BankAccount) -> Result<()>;

    async fn get_account(&self, id: Uuid) -> Result<Option<BankAccount>>;

    async fn list_accounts(&self, connection_id: Uuid) -> Result<Vec<BankAccount>>;

    async fn update_account(&self, account: &BankAccount) -> Result<()>;

    // === Transactions ===

    /// Insert or update by `provider_transaction_id`, all-or-nothing
    async fn upsert_transactions(&self, transactions: &[Transaction]) -> Result<UpsertSummary>;

    async fn list_transactions(&self, bank_account_id: Uuid) -> Result<Vec<Transaction>>;

    /// Number of transactions first stored at or after `since`
    async fn count_transactions_created_since(
        &self,
        bank_account_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<u64>;

    // === Activity ===

    async fn append_activity(&self, activity: &UserActivity) -> Result<()>;

    /// Most recent first
    async fn list_activity(&self, user_id: Uuid) -> Result<Vec<UserActivity>>;
}

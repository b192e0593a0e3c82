//! Account syncer - balance refresh for one bank account

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{
    AccountStatus, BalanceUpdate, BankAccount, BankConnection, ConnectionStatus, Job,
};
use crate::ports::{ConnectionStore, JobQueue, ProviderRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSyncStatus {
    Success,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncAccountOutcome {
    pub status: AccountSyncStatus,
    pub balances: Option<BalanceUpdate>,
}

impl SyncAccountOutcome {
    fn skipped() -> Self {
        Self {
            status: AccountSyncStatus::Skipped,
            balances: None,
        }
    }
}

pub struct AccountSyncer {
    store: Arc<dyn ConnectionStore>,
    providers: ProviderRegistry,
    queue: Arc<dyn JobQueue>,
    settings: SyncSettings,
}

impl AccountSyncer {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        queue: Arc<dyn JobQueue>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            providers,
            queue,
            settings,
        }
    }

    pub async fn sync_account(
        &self,
        connection_id: Uuid,
        bank_account_id: Uuid,
        manual_sync: bool,
    ) -> Result<SyncAccountOutcome> {
        let mut account = self
            .store
            .get_account(bank_account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(bank_account_id.to_string()))?;
        let connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;

        if !connection.is_syncable() || !account.enabled {
            debug!(%bank_account_id, "Skipping account of inactive connection");
            return Ok(SyncAccountOutcome::skipped());
        }
        if !manual_sync && account.status != AccountStatus::Active {
            debug!(%bank_account_id, status = %account.status, "Skipping inactive account");
            return Ok(SyncAccountOutcome::skipped());
        }

        match self.refresh_balances(&connection, &mut account, manual_sync).await {
            Ok(balances) => Ok(SyncAccountOutcome {
                status: AccountSyncStatus::Success,
                balances: Some(balances),
            }),
            Err(e) => {
                self.record_failure(connection, &mut account, &e).await;
                Err(e)
            }
        }
    }

    async fn refresh_balances(
        &self,
        connection: &BankConnection,
        account: &mut BankAccount,
        manual_sync: bool,
    ) -> Result<BalanceUpdate> {
        let client = self.providers.get(connection.provider)?;
        let provider_accounts = client.get_accounts(&connection.access_token).await?;
        let matched = provider_accounts
            .into_iter()
            .find(|pa| pa.provider_account_id == account.provider_account_id)
            .ok_or_else(|| Error::ProviderAccountMismatch(account.provider_account_id.clone()))?;

        let update = BalanceUpdate {
            available_balance: matched.available_balance,
            current_balance: matched.current_balance,
            credit_limit: matched.limit,
            currency: matched
                .iso_currency_code
                .as_deref()
                .map(BankAccount::normalize_currency)
                .unwrap_or_else(|| account.currency.clone()),
            mask: matched.mask.or_else(|| account.mask.clone()),
        };

        let now = Utc::now();
        account.available_balance = update.available_balance;
        account.current_balance = update.current_balance;
        account.credit_limit = update.credit_limit;
        account.currency = update.currency.clone();
        account.mask = update.mask.clone();
        account.status = AccountStatus::Active;
        account.last_synced_at = Some(now);
        account.updated_at = now;
        self.store.update_account(account).await?;

        if manual_sync || self.settings.transactions_on_auto_sync {
            self.queue
                .schedule(
                    Job::UpsertTransactions {
                        connection_id: connection.id,
                        bank_account_id: account.id,
                        manual_sync,
                    },
                    Duration::ZERO,
                )
                .await?;
        }

        info!(bank_account_id = %account.id, "Account balances updated");
        Ok(update)
    }

    /// Mark the account inactive and flag the connection
    async fn record_failure(
        &self,
        mut connection: BankConnection,
        account: &mut BankAccount,
        failure: &Error,
    ) {
        let now = Utc::now();
        account.status = AccountStatus::Inactive;
        account.updated_at = now;
        if let Err(e) = self.store.update_account(account).await {
            error!(bank_account_id = %account.id, error = %e, "Failed to mark account inactive");
        }

        match connection.transition_to(ConnectionStatus::RequiresAttention, now) {
            Ok(()) => {
                connection.error_message = Some(failure.to_string());
                if let Err(e) = self.store.update_connection(&connection).await {
                    error!(connection_id = %connection.id, error = %e, "Failed to flag connection");
                }
            }
            Err(refused) => {
                warn!(connection_id = %connection.id, error = %refused, "Connection status left unchanged");
            }
        }
        warn!(bank_account_id = %account.id, error = %failure, "Account sync failed");
    }
}

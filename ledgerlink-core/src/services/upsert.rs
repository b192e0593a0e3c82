//! Transaction upserter - normalize provider records and persist them
//! idempotently, keyed by provider transaction id

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{Provider, ProviderTransaction, Transaction};
use crate::ports::{ConnectionStore, ProviderRegistry, UpsertSummary};

pub struct TransactionUpserter {
    store: Arc<dyn ConnectionStore>,
    providers: ProviderRegistry,
    settings: SyncSettings,
}

impl TransactionUpserter {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            providers,
            settings,
        }
    }

    /// Normalize and store a batch for one account
    ///
    /// The batch is all-or-nothing. Re-running it with the same records
    /// updates rows in place and inserts nothing.
    pub async fn upsert(
        &self,
        bank_account_id: Uuid,
        user_id: Uuid,
        provider: Provider,
        records: Vec<ProviderTransaction>,
    ) -> Result<UpsertSummary> {
        let account = self
            .store
            .get_account(bank_account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(bank_account_id.to_string()))?;

        let transactions: Vec<Transaction> = records
            .iter()
            .map(|r| Transaction::from_provider(provider, r, bank_account_id, user_id, &account.currency))
            .collect();

        if transactions.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let summary = self.store.upsert_transactions(&transactions).await?;
        info!(
            %bank_account_id,
            inserted = summary.inserted,
            updated = summary.updated,
            "Transactions upserted"
        );
        Ok(summary)
    }

    /// Fetch the lookback window for one account and upsert it
    pub async fn sync_account_transactions(
        &self,
        connection_id: Uuid,
        bank_account_id: Uuid,
    ) -> Result<UpsertSummary> {
        let connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;
        let account = self
            .store
            .get_account(bank_account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(bank_account_id.to_string()))?;

        if !connection.is_syncable() || !account.enabled {
            debug!(%bank_account_id, "Skipping transactions of inactive account");
            return Ok(UpsertSummary::default());
        }

        let (start, end) = self.lookback_window();
        let client = self.providers.get(connection.provider)?;
        let records: Vec<ProviderTransaction> = client
            .get_transactions(
                &connection.access_token,
                &connection,
                std::slice::from_ref(&account.provider_account_id),
                start,
                end,
            )
            .await?
            .into_iter()
            .filter(|r| r.provider_account_id == account.provider_account_id)
            .collect();

        debug!(%bank_account_id, count = records.len(), %start, %end, "Fetched transactions");
        self.upsert(bank_account_id, connection.user_id, connection.provider, records)
            .await
    }

    /// `[today - lookback_days, today]`
    pub fn lookback_window(&self) -> (NaiveDate, NaiveDate) {
        let end = Utc::now().date_naive();
        (end - Duration::days(self.settings.lookback_days), end)
    }
}

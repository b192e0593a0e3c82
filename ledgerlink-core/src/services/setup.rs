//! Connection setup - register provider credentials and disable connections

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountStatus, BankAccount, BankConnection, Provider};
use crate::ports::{ConnectionStore, ProviderRegistry};

pub struct SetupService {
    store: Arc<dyn ConnectionStore>,
    providers: ProviderRegistry,
}

impl SetupService {
    pub fn new(store: Arc<dyn ConnectionStore>, providers: ProviderRegistry) -> Self {
        Self { store, providers }
    }

    /// Store a new ACTIVE connection with one ACTIVE account per provider account
    ///
    /// The item must be healthy. `institution_name` overrides what the
    /// provider reports.
    pub async fn register_connection(
        &self,
        provider: Provider,
        access_token: &str,
        refresh_token: Option<String>,
        user_id: Uuid,
        institution_name: Option<String>,
    ) -> Result<(BankConnection, Vec<BankAccount>)> {
        if access_token.trim().is_empty() {
            return Err(Error::validation("Access token is required"));
        }

        let client = self.providers.get(provider)?;
        let item = client.get_item_details(access_token).await?;
        if let Some(error) = item.error {
            return Err(error.into());
        }
        let provider_accounts = client.get_accounts(access_token).await?;

        let mut connection = BankConnection::new(user_id, provider, access_token);
        connection.refresh_token = refresh_token;
        connection.institution_id = item.institution_id;
        connection.institution_name = institution_name.or(item.institution_name);
        connection.expires_at = item.consent_expires_at;
        connection.last_checked_at = Some(connection.created_at);
        self.store.insert_connection(&connection).await?;

        let mut accounts = Vec::with_capacity(provider_accounts.len());
        for pa in provider_accounts {
            let mut account = BankAccount::new(connection.id, pa.provider_account_id, pa.name);
            account.official_name = pa.official_name;
            account.account_type = pa.account_type;
            account.subtype = pa.subtype;
            account.available_balance = pa.available_balance;
            account.current_balance = pa.current_balance;
            account.credit_limit = pa.limit;
            if let Some(currency) = pa.iso_currency_code.as_deref() {
                account.currency = BankAccount::normalize_currency(currency);
            }
            account.mask = pa.mask;
            self.store.insert_account(&account).await?;
            accounts.push(account);
        }

        info!(
            connection_id = %connection.id,
            %provider,
            accounts = accounts.len(),
            "Connection registered"
        );
        Ok((connection, accounts))
    }

    /// Stop syncing a connection on the user's request
    ///
    /// The status is left as it is, only the disabled flag is set. Its
    /// accounts are disabled and marked DISCONNECTED.
    pub async fn disable_connection(&self, connection_id: Uuid) -> Result<BankConnection> {
        let mut connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| Error::ConnectionNotFound(connection_id.to_string()))?;

        let now = Utc::now();
        connection.disabled = true;
        self.store.update_connection(&connection).await?;

        for mut account in self.store.list_accounts(connection_id).await? {
            account.status = AccountStatus::Disconnected;
            account.enabled = false;
            account.updated_at = now;
            self.store.update_account(&account).await?;
        }

        info!(%connection_id, "Connection disabled");
        Ok(connection)
    }
}

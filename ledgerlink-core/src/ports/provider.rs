//! Provider client port
//!
//! Defines the interface to third-party banking data APIs (Plaid, Teller,
//! GoCardless, ...). Clients report failures as [`ProviderError`] values
//! with a typed code, never as bare strings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, ProviderError, Result};
use crate::domain::{BankConnection, Provider, ProviderTransaction};

/// Provider-side view of a connection ("item" in Plaid terms)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    /// Error the provider currently reports for the item; `None` when healthy
    pub error: Option<ProviderError>,
    pub consent_expires_at: Option<DateTime<Utc>>,
}

impl ItemDetails {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Account with balances as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub provider_account_id: String,
    pub name: String,
    pub official_name: Option<String>,
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub available_balance: Option<Decimal>,
    pub current_balance: Option<Decimal>,
    pub limit: Option<Decimal>,
    pub iso_currency_code: Option<String>,
    pub mask: Option<String>,
}

/// Credentials returned by a token refresh
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn get_item_details(&self, access_token: &str) -> Result<ItemDetails>;

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>>;

    /// Transactions dated within `[start, end]` for the given provider account ids
    async fn get_transactions(
        &self,
        access_token: &str,
        connection: &BankConnection,
        account_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderTransaction>>;

    /// Obtain fresh credentials for the connection
    async fn refresh_access_token(&self, connection: &BankConnection) -> Result<TokenSet> {
        Err(ProviderError::unsupported(format!(
            "{} does not support token refresh for connection {}",
            self.provider(),
            connection.id
        ))
        .into())
    }
}

/// Provider clients keyed by provider
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous one for the same provider
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.provider(), client);
    }

    pub fn with(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderClient>> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or_else(|| Error::config(format!("No client configured for provider {}", provider)))
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.clients.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

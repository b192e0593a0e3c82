//! Plaid API client
//!
//! Implements [`ProviderClient`] over Plaid's JSON-over-POST API.
//! Plaid error bodies are translated into typed [`ProviderErrorCode`]s here,
//! so nothing downstream inspects Plaid's wire codes or message text.
//!
//! API Documentation: https://plaid.com/docs/api/

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::domain::result::{Error, ProviderError, ProviderErrorCode, Result};
use crate::domain::{BankConnection, Provider, ProviderTransaction};
use crate::ports::{ItemDetails, ProviderAccount, ProviderClient, TokenSet};

/// Default API URL (sandbox, so an unconfigured install never hits production)
pub const PLAID_SANDBOX_URL: &str = "https://sandbox.plaid.com";

/// Page size for /transactions/get (Plaid maximum)
const TRANSACTIONS_PAGE_SIZE: usize = 500;

// =============================================================================
// API Response Models
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaidError {
    pub error_type: String,
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub display_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemGetResponse {
    item: PlaidItem,
}

#[derive(Debug, Deserialize)]
struct PlaidItem {
    #[serde(default)]
    institution_id: Option<String>,
    #[serde(default)]
    institution_name: Option<String>,
    #[serde(default)]
    error: Option<PlaidError>,
    #[serde(default)]
    consent_expiration_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<PlaidAccount>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaidAccount {
    pub account_id: String,
    pub balances: PlaidBalances,
    #[serde(default)]
    pub mask: Option<String>,
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaidBalances {
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub available: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub current: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub limit: Option<Decimal>,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    #[serde(default)]
    pub unofficial_currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<PlaidTransaction>,
    total_transactions: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaidTransaction {
    pub transaction_id: String,
    pub account_id: String,
    /// Positive = money out
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    pub date: NaiveDate,
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub personal_finance_category: Option<PersonalFinanceCategory>,
    /// Legacy category hierarchy, e.g. ["Food and Drink", "Restaurants"]
    #[serde(default)]
    pub category: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonalFinanceCategory {
    pub primary: String,
    #[serde(default)]
    pub detailed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvalidateResponse {
    new_access_token: String,
}

/// Deserialize amount that can be number or string
fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    json_to_decimal(&value)
        .ok_or_else(|| D::Error::custom("expected number or string for amount"))
}

fn deserialize_optional_amount<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => json_to_decimal(&v)
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected number or string for amount")),
    }
}

fn json_to_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => n.to_string().parse().ok(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Translate a Plaid error body into a typed provider error
pub fn map_plaid_error(error: &PlaidError) -> ProviderError {
    let code = match (error.error_type.as_str(), error.error_code.as_str()) {
        (_, "ITEM_LOGIN_REQUIRED") => ProviderErrorCode::LoginRequired,
        (_, "INVALID_ACCESS_TOKEN") => ProviderErrorCode::InvalidAccessToken,
        ("RATE_LIMIT_EXCEEDED", _) | (_, "RATE_LIMIT_EXCEEDED") => ProviderErrorCode::RateLimited,
        ("INSTITUTION_ERROR", _) | ("API_ERROR", _) => ProviderErrorCode::Transient,
        (_, "PRODUCT_NOT_READY") => ProviderErrorCode::Transient,
        (_, other) => ProviderErrorCode::Other(other.to_string()),
    };
    let message = if error.error_message.is_empty() {
        format!("Plaid returned {}", error.error_type.to_lowercase())
    } else {
        error.error_message.clone()
    };
    ProviderError::new(code, message)
}

// =============================================================================
// Plaid HTTP Client
// =============================================================================

pub struct PlaidClient {
    client: Client,
    client_id: String,
    secret: String,
    base_url: String,
}

impl PlaidClient {
    pub fn new(client_id: &str, secret: &str, base_url: &str) -> Result<Self> {
        if client_id.is_empty() || secret.is_empty() {
            return Err(Error::config("Plaid client id and secret are required"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            secret: secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` (plus credentials) to `path` and decode the response
    async fn post<T: DeserializeOwned>(&self, path: &str, mut body: JsonValue) -> Result<T> {
        body["client_id"] = json!(self.client_id);
        body["secret"] = json!(self.secret);

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                ProviderError::transient(format!("Failed to parse Plaid response from {}: {}", path, e))
                    .into()
            });
        }

        let text = response.text().await.unwrap_or_default();
        let error = match serde_json::from_str::<PlaidError>(&text) {
            Ok(plaid_error) => map_plaid_error(&plaid_error),
            Err(_) if status.as_u16() == 429 => {
                ProviderError::rate_limited("Plaid rate limit exceeded")
            }
            Err(_) if status.is_server_error() => {
                ProviderError::transient(format!("Plaid API error: HTTP {}", status.as_u16()))
            }
            Err(_) => ProviderError::new(
                ProviderErrorCode::Other(format!("http_{}", status.as_u16())),
                format!("Plaid API error: HTTP {}", status.as_u16()),
            ),
        };
        tracing::debug!(path, status = status.as_u16(), code = %error.code, "Plaid request failed");
        Err(error.into())
    }

    fn map_account(account: PlaidAccount) -> ProviderAccount {
        ProviderAccount {
            provider_account_id: account.account_id,
            name: account.name,
            official_name: account.official_name,
            account_type: account.account_type,
            subtype: account.subtype,
            available_balance: account.balances.available,
            current_balance: account.balances.current,
            limit: account.balances.limit,
            iso_currency_code: account
                .balances
                .iso_currency_code
                .or(account.balances.unofficial_currency_code),
            mask: account.mask,
        }
    }

    fn map_transaction(tx: PlaidTransaction) -> ProviderTransaction {
        let (category, subcategory) = match (tx.personal_finance_category, tx.category) {
            (Some(pfc), _) => (Some(pfc.primary), pfc.detailed),
            (None, Some(legacy)) => {
                let mut parts = legacy.into_iter();
                (parts.next(), parts.next())
            }
            (None, None) => (None, None),
        };

        ProviderTransaction {
            provider_transaction_id: tx.transaction_id,
            provider_account_id: tx.account_id,
            amount: tx.amount,
            iso_currency_code: tx.iso_currency_code,
            date: tx.date,
            name: tx.name,
            merchant_name: tx.merchant_name,
            category,
            subcategory,
            pending: tx.pending,
        }
    }
}

#[async_trait]
impl ProviderClient for PlaidClient {
    fn provider(&self) -> Provider {
        Provider::Plaid
    }

    async fn get_item_details(&self, access_token: &str) -> Result<ItemDetails> {
        let response: ItemGetResponse = self
            .post("/item/get", json!({ "access_token": access_token }))
            .await?;

        Ok(ItemDetails {
            institution_id: response.item.institution_id,
            institution_name: response.item.institution_name,
            error: response.item.error.as_ref().map(map_plaid_error),
            consent_expires_at: response.item.consent_expiration_time,
        })
    }

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>> {
        let response: AccountsResponse = self
            .post("/accounts/balance/get", json!({ "access_token": access_token }))
            .await?;

        Ok(response.accounts.into_iter().map(Self::map_account).collect())
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        connection: &BankConnection,
        account_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderTransaction>> {
        let mut transactions = Vec::new();

        loop {
            let body = json!({
                "access_token": access_token,
                "start_date": start.format("%Y-%m-%d").to_string(),
                "end_date": end.format("%Y-%m-%d").to_string(),
                "options": {
                    "account_ids": account_ids,
                    "count": TRANSACTIONS_PAGE_SIZE,
                    "offset": transactions.len(),
                },
            });
            let page: TransactionsResponse = self.post("/transactions/get", body).await?;
            let received = page.transactions.len();
            transactions.extend(page.transactions.into_iter().map(Self::map_transaction));

            if received == 0 || transactions.len() >= page.total_transactions {
                break;
            }
        }

        tracing::debug!(
            connection_id = %connection.id,
            count = transactions.len(),
            "Fetched Plaid transactions"
        );
        Ok(transactions)
    }

    /// Rotate the access token
    ///
    /// Plaid access tokens do not expire, so there is no refresh token; the
    /// rotation endpoint is the closest equivalent.
    async fn refresh_access_token(&self, connection: &BankConnection) -> Result<TokenSet> {
        let response: InvalidateResponse = self
            .post(
                "/item/access_token/invalidate",
                json!({ "access_token": connection.access_token }),
            )
            .await?;

        Ok(TokenSet {
            access_token: response.new_access_token,
            refresh_token: None,
            expires_at: None,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Bank account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Disconnected,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "DISCONNECTED" => Ok(Self::Disconnected),
            other => Err(Error::validation(format!("Unknown account status: {}", other))),
        }
    }
}

/// One financial account under a bank connection
///
/// Note: account_type and subtype use Plaid nomenclature
/// ("depository"/"checking", "credit"/"credit card", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub provider_account_id: String,
    pub name: String,
    pub official_name: Option<String>,
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub available_balance: Option<Decimal>,
    pub current_balance: Option<Decimal>,
    pub credit_limit: Option<Decimal>,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub mask: Option<String>,
    pub status: AccountStatus,
    pub enabled: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    /// Create a new active account
    pub fn new(
        connection_id: Uuid,
        provider_account_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connection_id,
            provider_account_id: provider_account_id.into(),
            name: name.into(),
            official_name: None,
            account_type: None,
            subtype: None,
            available_balance: None,
            current_balance: None,
            credit_limit: None,
            currency: "USD".to_string(),
            mask: None,
            status: AccountStatus::Active,
            enabled: true,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }
}

/// Balance fields written by the account syncer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub available_balance: Option<Decimal>,
    pub current_balance: Option<Decimal>,
    pub credit_limit: Option<Decimal>,
    pub currency: String,
    pub mask: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        assert_eq!(BankAccount::normalize_currency("usd"), "USD");
        assert_eq!(BankAccount::normalize_currency(" eur "), "EUR");
    }

    #[test]
    fn test_new_account_is_active_and_enabled() {
        let account = BankAccount::new(Uuid::new_v4(), "acc_1", "Checking");
        assert_eq!(account.status, AccountStatus::Active);
        assert!(account.enabled);
        assert_eq!(account.currency, "USD");
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("INACTIVE".parse::<AccountStatus>().unwrap(), AccountStatus::Inactive);
        assert!("inactive".parse::<AccountStatus>().is_err());
    }
}

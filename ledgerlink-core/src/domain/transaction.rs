//! Transaction domain model

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::Provider;

/// A single financial movement belonging to a bank account
///
/// Sign convention: positive = expense, negative = income.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Provider transaction ID (dedup key, unique)
    pub provider_transaction_id: String,
    pub bank_account_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub name: String,
    pub merchant_name: Option<String>,
    /// Filled later by categorization; kept on update when the provider sends none
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub pending: bool,
    pub recurrence_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction as reported by a provider, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTransaction {
    pub provider_transaction_id: String,
    pub provider_account_id: String,
    /// Amount in the provider's own sign convention
    pub amount: Decimal,
    pub iso_currency_code: Option<String>,
    pub date: NaiveDate,
    pub name: String,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub pending: bool,
}

impl Transaction {
    /// Normalize a provider record into the internal schema
    pub fn from_provider(
        provider: Provider,
        record: &ProviderTransaction,
        bank_account_id: Uuid,
        user_id: Uuid,
        fallback_currency: &str,
    ) -> Self {
        let now = Utc::now();
        let amount = if provider.expenses_are_positive() {
            record.amount
        } else {
            -record.amount
        };

        Self {
            id: Uuid::new_v4(),
            provider_transaction_id: record.provider_transaction_id.clone(),
            bank_account_id,
            user_id,
            amount,
            currency: record
                .iso_currency_code
                .as_deref()
                .unwrap_or(fallback_currency)
                .trim()
                .to_uppercase(),
            date: record.date,
            name: record.name.trim().to_string(),
            merchant_name: record
                .merchant_name
                .as_deref()
                .map(Self::normalize_merchant)
                .filter(|m| !m.is_empty()),
            category: record.category.as_deref().map(slug),
            subcategory: record.subcategory.as_deref().map(slug),
            pending: record.pending,
            recurrence_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Collapse runs of whitespace and trim
    pub fn normalize_merchant(name: &str) -> String {
        static WHITESPACE: OnceLock<Regex> = OnceLock::new();
        let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
        re.replace_all(name.trim(), " ").to_string()
    }

    pub fn is_expense(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

/// "FOOD_AND_DRINK" / "Food and Drink" -> "food_and_drink"
fn slug(s: &str) -> String {
    s.trim().to_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amount: Decimal) -> ProviderTransaction {
        ProviderTransaction {
            provider_transaction_id: "tx_1".to_string(),
            provider_account_id: "acc_1".to_string(),
            amount,
            iso_currency_code: Some("usd".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            name: "  STARBUCKS 1234  ".to_string(),
            merchant_name: Some("Starbucks   Coffee\t Co".to_string()),
            category: Some("FOOD_AND_DRINK".to_string()),
            subcategory: Some("Coffee Shop".to_string()),
            pending: true,
        }
    }

    #[test]
    fn test_plaid_amounts_keep_sign() {
        let tx = Transaction::from_provider(
            Provider::Plaid,
            &record(Decimal::new(450, 2)),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "USD",
        );
        assert_eq!(tx.amount, Decimal::new(450, 2));
        assert!(tx.is_expense());
    }

    #[test]
    fn test_teller_amounts_are_negated() {
        let tx = Transaction::from_provider(
            Provider::Teller,
            &record(Decimal::new(-450, 2)),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "USD",
        );
        assert_eq!(tx.amount, Decimal::new(450, 2));
    }

    #[test]
    fn test_normalization() {
        let tx = Transaction::from_provider(
            Provider::Plaid,
            &record(Decimal::ONE),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "EUR",
        );
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.name, "STARBUCKS 1234");
        assert_eq!(tx.merchant_name.as_deref(), Some("Starbucks Coffee Co"));
        assert_eq!(tx.category.as_deref(), Some("food_and_drink"));
        assert_eq!(tx.subcategory.as_deref(), Some("coffee_shop"));
        assert!(tx.pending);
    }

    #[test]
    fn test_fallback_currency_and_blank_merchant() {
        let mut rec = record(Decimal::ONE);
        rec.iso_currency_code = None;
        rec.merchant_name = Some("   ".to_string());
        let tx = Transaction::from_provider(Provider::Plaid, &rec, Uuid::new_v4(), Uuid::new_v4(), "gbp");
        assert_eq!(tx.currency, "GBP");
        assert!(tx.merchant_name.is_none());
    }
}

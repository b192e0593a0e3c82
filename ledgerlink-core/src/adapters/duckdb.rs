//! DuckDB connection store

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, params_from_iter, Connection, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{BankAccount, BankConnection, Transaction, UserActivity};
use crate::migrations::MIGRATIONS;
use crate::ports::{ConnectionStore, UpsertSummary};
use crate::services::migration::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

const CONNECTION_COLUMNS: &str = "connection_id, user_id, provider, access_token, refresh_token,
    status, institution_id, institution_name, error_message,
    CAST(created_at AS VARCHAR), CAST(last_accessed_at AS VARCHAR),
    CAST(last_checked_at AS VARCHAR), CAST(last_synced_at AS VARCHAR),
    CAST(expires_at AS VARCHAR), CAST(last_notified_at AS VARCHAR),
    CAST(last_expiry_notified_at AS VARCHAR), CAST(status_changed_at AS VARCHAR),
    notification_count, expiry_notification_count, alert_count, disabled";

const ACCOUNT_COLUMNS: &str = "bank_account_id, connection_id, provider_account_id, name,
    official_name, account_type, subtype,
    CAST(available_balance AS VARCHAR), CAST(current_balance AS VARCHAR),
    CAST(credit_limit AS VARCHAR), currency, mask, status, enabled,
    CAST(last_synced_at AS VARCHAR), CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";

const TRANSACTION_COLUMNS: &str = "transaction_id, provider_transaction_id, bank_account_id,
    user_id, CAST(amount AS VARCHAR), currency, CAST(transaction_date AS VARCHAR), name,
    merchant_name, category, subcategory, pending, recurrence_id,
    CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";

/// DuckDB-backed [`ConnectionStore`]
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open (or create) the database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock, which happens when the worker and a CLI command start
    /// at the same time.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) if is_retryable_error(&e.to_string()) && attempt + 1 < MAX_RETRIES => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Database busy, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// In-memory store (tests, `--plan` dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading off: the JSON extension is linked statically
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Apply pending migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn, MIGRATIONS).run_pending()
    }

    /// Ensure the schema is current
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "Database migrations applied");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    // === Connections ===

    fn insert_connection_sync(&self, c: &BankConnection) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_connections (
                connection_id, user_id, provider, access_token, refresh_token, status,
                institution_id, institution_name, error_message, created_at,
                last_accessed_at, last_checked_at, last_synced_at, expires_at,
                last_notified_at, last_expiry_notified_at, status_changed_at,
                notification_count, expiry_notification_count, alert_count, disabled
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
                CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP),
                CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP),
                CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?, ?, ?)",
            params![
                c.id.to_string(),
                c.user_id.to_string(),
                c.provider.as_str(),
                c.access_token,
                c.refresh_token,
                c.status.as_str(),
                c.institution_id,
                c.institution_name,
                c.error_message,
                format_ts(c.created_at),
                c.last_accessed_at.map(format_ts),
                c.last_checked_at.map(format_ts),
                c.last_synced_at.map(format_ts),
                c.expires_at.map(format_ts),
                c.last_notified_at.map(format_ts),
                c.last_expiry_notified_at.map(format_ts),
                format_ts(c.status_changed_at),
                c.notification_count,
                c.expiry_notification_count,
                c.alert_count,
                c.disabled,
            ],
        )?;
        Ok(())
    }

    fn update_connection_sync(&self, c: &BankConnection) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE sys_connections SET
                access_token = ?, refresh_token = ?, status = ?,
                institution_id = ?, institution_name = ?, error_message = ?,
                last_accessed_at = CAST(? AS TIMESTAMP),
                last_checked_at = CAST(? AS TIMESTAMP),
                last_synced_at = CAST(? AS TIMESTAMP),
                expires_at = CAST(? AS TIMESTAMP),
                last_notified_at = CAST(? AS TIMESTAMP),
                last_expiry_notified_at = CAST(? AS TIMESTAMP),
                status_changed_at = CAST(? AS TIMESTAMP),
                notification_count = ?, expiry_notification_count = ?,
                alert_count = ?, disabled = ?
             WHERE connection_id = ?",
            params![
                c.access_token,
                c.refresh_token,
                c.status.as_str(),
                c.institution_id,
                c.institution_name,
                c.error_message,
                c.last_accessed_at.map(format_ts),
                c.last_checked_at.map(format_ts),
                c.last_synced_at.map(format_ts),
                c.expires_at.map(format_ts),
                c.last_notified_at.map(format_ts),
                c.last_expiry_notified_at.map(format_ts),
                format_ts(c.status_changed_at),
                c.notification_count,
                c.expiry_notification_count,
                c.alert_count,
                c.disabled,
                c.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::ConnectionNotFound(c.id.to_string()));
        }
        Ok(())
    }

    fn get_connection_sync(&self, id: Uuid) -> Result<Option<BankConnection>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_connections WHERE connection_id = ?",
            CONNECTION_COLUMNS
        );
        Ok(optional(conn.query_row(&sql, [id.to_string()], row_to_connection))?)
    }

    fn list_connections_sync(&self) -> Result<Vec<BankConnection>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_connections ORDER BY created_at",
            CONNECTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_connection)?;
        let mut connections = Vec::new();
        for row in rows {
            connections.push(row?);
        }
        Ok(connections)
    }

    // === Accounts ===

    fn insert_account_sync(&self, a: &BankAccount) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_bank_accounts (
                bank_account_id, connection_id, provider_account_id, name, official_name,
                account_type, subtype, available_balance, current_balance, credit_limit,
                currency, mask, status, enabled, last_synced_at, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?,
                CAST(? AS DECIMAL(18, 4)), CAST(? AS DECIMAL(18, 4)), CAST(? AS DECIMAL(18, 4)),
                ?, ?, ?, ?,
                CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
            params![
                a.id.to_string(),
                a.connection_id.to_string(),
                a.provider_account_id,
                a.name,
                a.official_name,
                a.account_type,
                a.subtype,
                a.available_balance.map(|d| d.to_string()),
                a.current_balance.map(|d| d.to_string()),
                a.credit_limit.map(|d| d.to_string()),
                a.currency,
                a.mask,
                a.status.as_str(),
                a.enabled,
                a.last_synced_at.map(format_ts),
                format_ts(a.created_at),
                format_ts(a.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_account_sync(&self, a: &BankAccount) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE sys_bank_accounts SET
                name = ?, official_name = ?, account_type = ?, subtype = ?,
                available_balance = CAST(? AS DECIMAL(18, 4)),
                current_balance = CAST(? AS DECIMAL(18, 4)),
                credit_limit = CAST(? AS DECIMAL(18, 4)),
                currency = ?, mask = ?, status = ?, enabled = ?,
                last_synced_at = CAST(? AS TIMESTAMP),
                updated_at = CAST(? AS TIMESTAMP)
             WHERE bank_account_id = ?",
            params![
                a.name,
                a.official_name,
                a.account_type,
                a.subtype,
                a.available_balance.map(|d| d.to_string()),
                a.current_balance.map(|d| d.to_string()),
                a.credit_limit.map(|d| d.to_string()),
                a.currency,
                a.mask,
                a.status.as_str(),
                a.enabled,
                a.last_synced_at.map(format_ts),
                format_ts(a.updated_at),
                a.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::AccountNotFound(a.id.to_string()));
        }
        Ok(())
    }

    fn get_account_sync(&self, id: Uuid) -> Result<Option<BankAccount>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_bank_accounts WHERE bank_account_id = ?",
            ACCOUNT_COLUMNS
        );
        Ok(optional(conn.query_row(&sql, [id.to_string()], row_to_account))?)
    }

    fn list_accounts_sync(&self, connection_id: Uuid) -> Result<Vec<BankAccount>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_bank_accounts WHERE connection_id = ? ORDER BY created_at, bank_account_id",
            ACCOUNT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([connection_id.to_string()], row_to_account)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    // === Transactions ===

    /// One DuckDB transaction for the whole batch; any failure rolls back
    fn upsert_transactions_sync(&self, batch: &[Transaction]) -> Result<UpsertSummary> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut summary = UpsertSummary::default();

        for t in batch {
            let existing: Option<String> = optional(tx.query_row(
                "SELECT transaction_id FROM sys_transactions WHERE provider_transaction_id = ?",
                [&t.provider_transaction_id],
                |row| row.get(0),
            ))?;

            match existing {
                Some(transaction_id) => {
                    // Category is only overwritten when the provider sends one
                    tx.execute(
                        "UPDATE sys_transactions SET
                            amount = CAST(? AS DECIMAL(18, 4)),
                            transaction_date = CAST(? AS DATE),
                            pending = ?,
                            merchant_name = ?,
                            category = COALESCE(?, category),
                            subcategory = COALESCE(?, subcategory),
                            updated_at = CAST(? AS TIMESTAMP)
                         WHERE transaction_id = ?",
                        params![
                            t.amount.to_string(),
                            t.date.to_string(),
                            t.pending,
                            t.merchant_name,
                            t.category,
                            t.subcategory,
                            format_ts(t.updated_at),
                            transaction_id,
                        ],
                    )?;
                    summary.updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO sys_transactions (
                            transaction_id, provider_transaction_id, bank_account_id, user_id,
                            amount, currency, transaction_date, name, merchant_name,
                            category, subcategory, pending, recurrence_id, created_at, updated_at
                         ) VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18, 4)), ?, CAST(? AS DATE),
                            ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                        params![
                            t.id.to_string(),
                            t.provider_transaction_id,
                            t.bank_account_id.to_string(),
                            t.user_id.to_string(),
                            t.amount.to_string(),
                            t.currency,
                            t.date.to_string(),
                            t.name,
                            t.merchant_name,
                            t.category,
                            t.subcategory,
                            t.pending,
                            t.recurrence_id.map(|id| id.to_string()),
                            format_ts(t.created_at),
                            format_ts(t.updated_at),
                        ],
                    )?;
                    summary.inserted += 1;
                }
            }
        }

        tx.commit()?;
        Ok(summary)
    }

    fn list_transactions_sync(&self, bank_account_id: Uuid) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_transactions WHERE bank_account_id = ?
             ORDER BY transaction_date DESC, provider_transaction_id",
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([bank_account_id.to_string()], row_to_transaction)?;
        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?);
        }
        Ok(transactions)
    }

    fn count_transactions_created_since_sync(
        &self,
        bank_account_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<u64> {
        if bank_account_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.lock()?;
        let placeholders = vec!["?"; bank_account_ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM sys_transactions
             WHERE created_at >= CAST(? AS TIMESTAMP) AND bank_account_id IN ({})",
            placeholders
        );
        let mut values = vec![format_ts(since)];
        values.extend(bank_account_ids.iter().map(|id| id.to_string()));
        let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    // === Activity ===

    fn append_activity_sync(&self, activity: &UserActivity) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_user_activity (activity_id, user_id, activity_type, detail, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                activity.id.to_string(),
                activity.user_id.to_string(),
                activity.activity_type,
                activity.detail,
                activity.metadata.to_string(),
                format_ts(activity.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_activity_sync(&self, user_id: Uuid) -> Result<Vec<UserActivity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT activity_id, user_id, activity_type, detail, metadata, CAST(created_at AS VARCHAR)
             FROM sys_user_activity WHERE user_id = ?
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([user_id.to_string()], |row| {
            let metadata: Option<String> = row.get(4)?;
            Ok(UserActivity {
                id: get_uuid(row, 0)?,
                user_id: get_uuid(row, 1)?,
                activity_type: row.get(2)?,
                detail: row.get(3)?,
                metadata: metadata
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(serde_json::Value::Null),
                created_at: get_ts(row, 5)?,
            })
        })?;
        let mut activity = Vec::new();
        for row in rows {
            activity.push(row?);
        }
        Ok(activity)
    }
}

#[async_trait]
impl ConnectionStore for DuckDbStore {
    async fn insert_connection(&self, connection: &BankConnection) -> Result<()> {
        self.insert_connection_sync(connection)
    }

    async fn get_connection(&self, id: Uuid) -> Result<Option<BankConnection>> {
        self.get_connection_sync(id)
    }

    async fn list_connections(&self) -> Result<Vec<BankConnection>> {
        self.list_connections_sync()
    }

    async fn update_connection(&self, connection: &BankConnection) -> Result<()> {
        self.update_connection_sync(connection)
    }

    async fn insert_account(&self, account: &BankAccount) -> Result<()> {
        self.insert_account_sync(account)
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<BankAccount>> {
        self.get_account_sync(id)
    }

    async fn list_accounts(&self, connection_id: Uuid) -> Result<Vec<BankAccount>> {
        self.list_accounts_sync(connection_id)
    }

    async fn update_account(&self, account: &BankAccount) -> Result<()> {
        self.update_account_sync(account)
    }

    async fn upsert_transactions(&self, transactions: &[Transaction]) -> Result<UpsertSummary> {
        self.upsert_transactions_sync(transactions)
    }

    async fn list_transactions(&self, bank_account_id: Uuid) -> Result<Vec<Transaction>> {
        self.list_transactions_sync(bank_account_id)
    }

    async fn count_transactions_created_since(
        &self,
        bank_account_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.count_transactions_created_since_sync(bank_account_ids, since)
    }

    async fn append_activity(&self, activity: &UserActivity) -> Result<()> {
        self.append_activity_sync(activity)
    }

    async fn list_activity(&self, user_id: Uuid) -> Result<Vec<UserActivity>> {
        self.list_activity_sync(user_id)
    }
}

// Row mapping

fn row_to_connection(row: &Row) -> duckdb::Result<BankConnection> {
    Ok(BankConnection {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        provider: get_parsed(row, 2)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4)?,
        status: get_parsed(row, 5)?,
        institution_id: row.get(6)?,
        institution_name: row.get(7)?,
        error_message: row.get(8)?,
        created_at: get_ts(row, 9)?,
        last_accessed_at: get_opt_ts(row, 10)?,
        last_checked_at: get_opt_ts(row, 11)?,
        last_synced_at: get_opt_ts(row, 12)?,
        expires_at: get_opt_ts(row, 13)?,
        last_notified_at: get_opt_ts(row, 14)?,
        last_expiry_notified_at: get_opt_ts(row, 15)?,
        status_changed_at: get_ts(row, 16)?,
        notification_count: row.get(17)?,
        expiry_notification_count: row.get(18)?,
        alert_count: row.get(19)?,
        disabled: row.get(20)?,
    })
}

fn row_to_account(row: &Row) -> duckdb::Result<BankAccount> {
    Ok(BankAccount {
        id: get_uuid(row, 0)?,
        connection_id: get_uuid(row, 1)?,
        provider_account_id: row.get(2)?,
        name: row.get(3)?,
        official_name: row.get(4)?,
        account_type: row.get(5)?,
        subtype: row.get(6)?,
        available_balance: get_opt_decimal(row, 7)?,
        current_balance: get_opt_decimal(row, 8)?,
        credit_limit: get_opt_decimal(row, 9)?,
        currency: row.get(10)?,
        mask: row.get(11)?,
        status: get_parsed(row, 12)?,
        enabled: row.get(13)?,
        last_synced_at: get_opt_ts(row, 14)?,
        created_at: get_ts(row, 15)?,
        updated_at: get_ts(row, 16)?,
    })
}

fn row_to_transaction(row: &Row) -> duckdb::Result<Transaction> {
    let recurrence_id: Option<String> = row.get(12)?;
    let date: String = row.get(6)?;
    Ok(Transaction {
        id: get_uuid(row, 0)?,
        provider_transaction_id: row.get(1)?,
        bank_account_id: get_uuid(row, 2)?,
        user_id: get_uuid(row, 3)?,
        amount: get_parsed::<Decimal>(row, 4)?.normalize(),
        currency: row.get(5)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(6, e))?,
        name: row.get(7)?,
        merchant_name: row.get(8)?,
        category: row.get(9)?,
        subcategory: row.get(10)?,
        pending: row.get(11)?,
        recurrence_id: recurrence_id
            .map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(12, e)))
            .transpose()?,
        created_at: get_ts(row, 13)?,
        updated_at: get_ts(row, 14)?,
    })
}

// Helper functions

fn optional<T>(result: duckdb::Result<T>) -> duckdb::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn conversion_error<E>(idx: usize, e: E) -> duckdb::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_parsed<T>(row: &Row, idx: usize) -> duckdb::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn get_uuid(row: &Row, idx: usize) -> duckdb::Result<Uuid> {
    get_parsed(row, idx)
}

fn get_opt_decimal(row: &Row, idx: usize) -> duckdb::Result<Option<Decimal>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        Decimal::from_str(&s)
            .map(|d| d.normalize())
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn get_ts(row: &Row, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(&s).map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row, idx: usize) -> duckdb::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_ts(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// UTC timestamp in the text form DuckDB casts to TIMESTAMP
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse DuckDB's VARCHAR rendering of a TIMESTAMP (fraction optional)
fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountStatus, ConnectionStatus, Provider};
    use chrono::{Duration as ChronoDuration, Timelike};

    fn store() -> DuckDbStore {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn transaction(account: &BankAccount, provider_id: &str, cents: i64) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            provider_transaction_id: provider_id.to_string(),
            bank_account_id: account.id,
            user_id: Uuid::new_v4(),
            amount: Decimal::new(cents, 2),
            currency: "USD".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            name: "Coffee".to_string(),
            merchant_name: Some("Blue Bottle".to_string()),
            category: Some("food_and_drink".to_string()),
            subcategory: None,
            pending: true,
            recurrence_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_retryable_error_detection() {
        assert!(is_retryable_error(
            "The process cannot access the file because it is being used by another process"
        ));
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("database is locked"));
        assert!(!is_retryable_error("Permission denied"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let dt = Utc::now().with_nanosecond(123_456_000).unwrap();
        assert_eq!(parse_ts(&format_ts(dt)).unwrap(), dt);
        assert!(parse_ts("2025-01-02 03:04:05").is_ok());
    }

    #[tokio::test]
    async fn test_connection_round_trip() {
        let store = store();
        let mut connection = BankConnection::new(Uuid::new_v4(), Provider::Plaid, "access-sandbox");
        connection.institution_name = Some("Chase".to_string());
        connection.expires_at = Some(Utc::now() + ChronoDuration::days(10));
        store.insert_connection(&connection).await.unwrap();

        connection.status = ConnectionStatus::LoginRequired;
        connection.error_message = Some("Login required".to_string());
        connection.notification_count = 2;
        store.update_connection(&connection).await.unwrap();

        let loaded = store.get_connection(connection.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ConnectionStatus::LoginRequired);
        assert_eq!(loaded.provider, Provider::Plaid);
        assert_eq!(loaded.access_token, "access-sandbox");
        assert_eq!(loaded.institution_name.as_deref(), Some("Chase"));
        assert_eq!(loaded.notification_count, 2);
        assert!(loaded.expires_at.is_some());
        assert!(loaded.last_checked_at.is_none());

        assert!(store.get_connection(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(store.list_connections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_connection_fails() {
        let store = store();
        let connection = BankConnection::new(Uuid::new_v4(), Provider::Plaid, "tok");
        let err = store.update_connection(&connection).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_account_balances_are_exact() {
        let store = store();
        let mut account = BankAccount::new(Uuid::new_v4(), "acc_1", "Checking");
        account.current_balance = Some(Decimal::new(123_456, 2));
        store.insert_account(&account).await.unwrap();

        account.available_balance = Some(Decimal::new(100_001, 2));
        account.status = AccountStatus::Inactive;
        store.update_account(&account).await.unwrap();

        let loaded = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_balance, Some(Decimal::new(123_456, 2)));
        assert_eq!(loaded.available_balance, Some(Decimal::new(100_001, 2)));
        assert_eq!(loaded.credit_limit, None);
        assert_eq!(loaded.status, AccountStatus::Inactive);

        let listed = store.list_accounts(account.connection_id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_counts_inserts_and_updates() {
        let store = store();
        let account = BankAccount::new(Uuid::new_v4(), "acc_1", "Checking");

        let first = vec![transaction(&account, "tx_1", 450), transaction(&account, "tx_2", 1200)];
        let summary = store.upsert_transactions(&first).await.unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 2, updated: 0 });

        let mut changed = transaction(&account, "tx_1", 475);
        changed.pending = false;
        changed.category = None;
        let summary = store.upsert_transactions(&[changed]).await.unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 0, updated: 1 });

        let stored = store.list_transactions(account.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        let tx1 = stored
            .iter()
            .find(|t| t.provider_transaction_id == "tx_1")
            .unwrap();
        assert_eq!(tx1.amount, Decimal::new(475, 2));
        assert!(!tx1.pending);
        // Existing category kept when the update carries none
        assert_eq!(tx1.category.as_deref(), Some("food_and_drink"));
    }

    #[tokio::test]
    async fn test_count_created_since() {
        let store = store();
        let account = BankAccount::new(Uuid::new_v4(), "acc_1", "Checking");
        let since = Utc::now() - ChronoDuration::minutes(5);

        let mut old = transaction(&account, "tx_old", 100);
        old.created_at = since - ChronoDuration::days(1);
        store
            .upsert_transactions(&[old, transaction(&account, "tx_new", 200)])
            .await
            .unwrap();

        let count = store
            .count_transactions_created_since(&[account.id], since)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            store.count_transactions_created_since(&[], since).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_activity_is_listed_newest_first() {
        let store = store();
        let user_id = Uuid::new_v4();
        let mut first = UserActivity::new(user_id, "connection_warning", "first", serde_json::json!({"n": 1}));
        first.created_at = Utc::now() - ChronoDuration::hours(1);
        let second = UserActivity::new(user_id, "connection_recovered", "second", serde_json::Value::Null);
        store.append_activity(&first).await.unwrap();
        store.append_activity(&second).await.unwrap();

        let activity = store.list_activity(user_id).await.unwrap();
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].activity_type, "connection_recovered");
        assert_eq!(activity[1].metadata["n"], serde_json::json!(1));
    }
}

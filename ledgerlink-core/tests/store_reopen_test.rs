//! Reopening the database file between runs
//!
//! Run with: cargo test --test store_reopen_test -- --nocapture

use tempfile::TempDir;
use uuid::Uuid;

use ledgerlink_core::adapters::duckdb::DuckDbStore;
use ledgerlink_core::domain::{BankConnection, ConnectionStatus, Provider};
use ledgerlink_core::ports::ConnectionStore;

#[tokio::test]
async fn test_connections_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.duckdb");

    let mut connection = BankConnection::new(Uuid::new_v4(), Provider::Plaid, "access-sandbox-1");
    connection.institution_name = Some("First Platypus Bank".to_string());
    {
        let store = DuckDbStore::open(&db_path).unwrap();
        store.ensure_schema().unwrap();
        store.insert_connection(&connection).await.unwrap();

        connection.status = ConnectionStatus::LoginRequired;
        connection.error_message = Some("login required".to_string());
        store.update_connection(&connection).await.unwrap();
    }

    let store = DuckDbStore::open(&db_path).unwrap();
    store.ensure_schema().unwrap();
    let stored = store.get_connection(connection.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConnectionStatus::LoginRequired);
    assert_eq!(stored.error_message.as_deref(), Some("login required"));
    assert_eq!(stored.institution_name.as_deref(), Some("First Platypus Bank"));
    assert_eq!(store.list_connections().await.unwrap().len(), 1);
}

#[test]
fn test_migrations_apply_once() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.duckdb");

    let first = {
        let store = DuckDbStore::open(&db_path).unwrap();
        store.run_migrations().unwrap()
    };
    assert!(!first.applied.is_empty());

    for _ in 0..3 {
        let store = DuckDbStore::open(&db_path).unwrap();
        let again = store.run_migrations().unwrap();
        assert!(again.applied.is_empty(), "applied {:?}", again.applied);
    }
}

//! Integration tests for the expiring and disconnected sweeps
//!
//! Run with: cargo test --test sweep_tests -- --nocapture

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::Harness;
use ledgerlink_core::adapters::recording_queue::ScheduledJob;
use ledgerlink_core::domain::activity::CONNECTION_DISABLED;
use ledgerlink_core::domain::{AccountStatus, ConnectionStatus, Job, Notification, NotificationType};
use ledgerlink_core::ports::ConnectionStore;
use ledgerlink_core::services::ExpirationService;

fn sweeper(h: &Harness) -> ExpirationService {
    ExpirationService::new(
        h.store(),
        h.queue(),
        h.config.thresholds.clone(),
        h.config.environment,
    )
}

fn notifications(scheduled: &[ScheduledJob]) -> Vec<Notification> {
    scheduled
        .iter()
        .filter_map(|s| match &s.job {
            Job::ConnectionNotification(n) => Some(n.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Expiring sweep
// ============================================================================

#[tokio::test]
async fn test_inactive_25_days_gets_one_warning() {
    let h = Harness::production();
    let (mut connection, _) = h.seed_connection(1).await;
    let now = Utc::now();
    connection.last_accessed_at = Some(now - Duration::days(25));
    h.save(&connection).await;

    let report = sweeper(&h).sweep_expiring(now).await.unwrap();
    assert_eq!(report.notified, 1);

    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionWarning);
    assert_eq!(sent[0].title, "Bank Connection Expiring Soon");
    assert_eq!(sent[0].data["daysUntilExpiry"], json!(5));

    let stored = h.connection(connection.id).await;
    assert_eq!(stored.expiry_notification_count, 1);
    assert!(stored.last_expiry_notified_at.is_some());
    assert_eq!(stored.status, ConnectionStatus::Active);

    // Second run the same day is within the cooldown
    let again = sweeper(&h).sweep_expiring(now + Duration::hours(1)).await.unwrap();
    assert_eq!(again.notified, 0);
    assert_eq!(notifications(&h.queue.scheduled()).len(), 1);
}

#[tokio::test]
async fn test_sweeps_do_nothing_outside_production() {
    let h = Harness::new();
    let (mut connection, _) = h.seed_connection(1).await;
    connection.last_accessed_at = Some(Utc::now() - Duration::days(25));
    connection.status = ConnectionStatus::LoginRequired;
    h.save(&connection).await;

    let expiring = sweeper(&h).sweep_expiring(Utc::now()).await.unwrap();
    let disconnected = sweeper(&h).sweep_disconnected(Utc::now()).await.unwrap();
    assert!(expiring.skipped_environment);
    assert!(disconnected.skipped_environment);
    assert!(h.queue.scheduled().is_empty());
}

#[tokio::test]
async fn test_long_inactivity_requires_attention() {
    let h = Harness::production();
    let (mut connection, _) = h.seed_connection(1).await;
    let now = Utc::now();
    connection.last_accessed_at = Some(now - Duration::days(31));
    h.save(&connection).await;

    let report = sweeper(&h).sweep_expiring(now).await.unwrap();
    assert_eq!(report.status_changes, 1);

    let stored = h.connection(connection.id).await;
    assert_eq!(stored.status, ConnectionStatus::RequiresAttention);
    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionExpired);
}

#[tokio::test]
async fn test_passed_provider_expiry_requires_reauth() {
    let h = Harness::production();
    let (mut connection, _) = h.seed_connection(1).await;
    let now = Utc::now();
    connection.expires_at = Some(now - Duration::hours(2));
    h.save(&connection).await;

    sweeper(&h).sweep_expiring(now).await.unwrap();

    assert_eq!(
        h.connection(connection.id).await.status,
        ConnectionStatus::RequiresReauth
    );
    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionExpired);
}

#[tokio::test]
async fn test_provider_expiry_within_three_days_is_critical() {
    let h = Harness::production();
    let (mut connection, _) = h.seed_connection(1).await;
    let now = Utc::now();
    connection.expires_at = Some(now + Duration::days(2) + Duration::hours(3));
    h.save(&connection).await;

    sweeper(&h).sweep_expiring(now).await.unwrap();

    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionCritical);
    assert_eq!(sent[0].data["daysUntilExpiry"], json!(2));
}

// ============================================================================
// Disconnected sweep
// ============================================================================

#[tokio::test]
async fn test_broken_connection_gets_warning_then_cooldown() {
    let h = Harness::production();
    let (mut connection, _) = h.seed_connection(1).await;
    let now = Utc::now();
    connection.status = ConnectionStatus::LoginRequired;
    connection.status_changed_at = now - Duration::days(2);
    h.save(&connection).await;

    let report = sweeper(&h).sweep_disconnected(now).await.unwrap();
    assert_eq!(report.notified, 1);
    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionWarning);

    let stored = h.connection(connection.id).await;
    assert_eq!(stored.notification_count, 1);
    assert_eq!(stored.alert_count, 0);

    let again = sweeper(&h).sweep_disconnected(now + Duration::days(1)).await.unwrap();
    assert_eq!(again.notified, 0);
}

#[tokio::test]
async fn test_week_old_issue_escalates_to_critical() {
    let h = Harness::production();
    let (mut connection, _) = h.seed_connection(1).await;
    let now = Utc::now();
    connection.status = ConnectionStatus::Error;
    connection.status_changed_at = now - Duration::days(8);
    h.save(&connection).await;

    sweeper(&h).sweep_disconnected(now).await.unwrap();

    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionCritical);
    assert_eq!(h.connection(connection.id).await.alert_count, 1);
}

#[tokio::test]
async fn test_abandoned_connection_is_auto_disabled() {
    let h = Harness::production();
    let (mut connection, accounts) = h.seed_connection(2).await;
    let now = Utc::now();
    connection.status = ConnectionStatus::RequiresAttention;
    connection.status_changed_at = now - Duration::days(31);
    connection.notification_count = 5;
    connection.last_notified_at = Some(now - Duration::days(1));
    h.save(&connection).await;

    let report = sweeper(&h).sweep_disconnected(now).await.unwrap();
    assert_eq!(report.disabled, 1);

    let stored = h.connection(connection.id).await;
    assert_eq!(stored.status, ConnectionStatus::Disconnected);
    assert!(stored.disabled);
    for account in &accounts {
        let stored = h.account(account.id).await;
        assert_eq!(stored.status, AccountStatus::Disconnected);
        assert!(!stored.enabled);
    }

    let activity = h.store.list_activity(connection.user_id).await.unwrap();
    assert_eq!(activity[0].activity_type, CONNECTION_DISABLED);

    let sent = notifications(&h.queue.scheduled());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].notification_type, NotificationType::ConnectionCritical);

    // Disabled connections are out of scope for later sweeps
    let again = sweeper(&h).sweep_disconnected(now).await.unwrap();
    assert_eq!(again.examined, 0);
}

#[tokio::test]
async fn test_healthy_connections_are_ignored() {
    let h = Harness::production();
    h.seed_connection(1).await;

    let report = sweeper(&h).sweep_disconnected(Utc::now()).await.unwrap();
    assert_eq!(report.examined, 0);
    assert!(h.queue.scheduled().is_empty());
}

//! Job runner - executes queued jobs under their registry limits
//!
//! Each job runs under `tokio::time::timeout`. A failed job is handed to
//! its descriptor's retry policy and either re-enqueued with the next
//! attempt number or given up. Every outcome goes to the job event log.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn, Instrument};

use crate::adapters::tokio_queue::JobReceiver;
use crate::config::Config;
use crate::domain::result::{Error, ErrorKind, Result};
use crate::domain::{Job, JobEnvelope};
use crate::ports::{ConnectionStore, JobQueue, Notifier, ProviderRegistry};
use crate::services::account_sync::AccountSyncer;
use crate::services::expiration::ExpirationService;
use crate::services::logging::{
    LogEvent, LoggingService, JOB_FAILED, JOB_GAVE_UP, JOB_RETRY_SCHEDULED, JOB_SUCCEEDED,
};
use crate::services::notification::NotificationService;
use crate::services::recovery::RecoveryService;
use crate::services::registry::JobRegistry;
use crate::services::retry::RetryDecision;
use crate::services::sync::SyncOrchestrator;
use crate::services::token_refresh::TokenRefreshService;
use crate::services::upsert::TransactionUpserter;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded {
        output: JsonValue,
    },
    RetryScheduled {
        error: String,
        delay_secs: u64,
    },
    GaveUp {
        error: String,
        kind: ErrorKind,
    },
}

/// One handled envelope
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: &'static str,
    pub attempt: u32,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub retried: usize,
    pub gave_up: usize,
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    fn add(&mut self, report: JobReport) {
        match report.outcome {
            JobOutcome::Succeeded { .. } => self.succeeded += 1,
            JobOutcome::RetryScheduled { .. } => self.retried += 1,
            JobOutcome::GaveUp { .. } => self.gave_up += 1,
        }
        self.reports.push(report);
    }
}

pub struct JobRunner {
    sync: SyncOrchestrator,
    accounts: AccountSyncer,
    upserter: TransactionUpserter,
    recovery: RecoveryService,
    refresh: TokenRefreshService,
    expiration: ExpirationService,
    notifications: NotificationService,
    registry: JobRegistry,
    queue: Arc<dyn JobQueue>,
    event_log: Option<Arc<LoggingService>>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        providers: ProviderRegistry,
        queue: Arc<dyn JobQueue>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            sync: SyncOrchestrator::new(
                store.clone(),
                providers.clone(),
                queue.clone(),
                config.sync.clone(),
            ),
            accounts: AccountSyncer::new(
                store.clone(),
                providers.clone(),
                queue.clone(),
                config.sync.clone(),
            ),
            upserter: TransactionUpserter::new(store.clone(), providers.clone(), config.sync.clone()),
            recovery: RecoveryService::new(
                store.clone(),
                providers.clone(),
                queue.clone(),
                config.recovery.clone(),
            ),
            refresh: TokenRefreshService::new(store.clone(), providers, queue.clone()),
            expiration: ExpirationService::new(
                store.clone(),
                queue.clone(),
                config.thresholds.clone(),
                config.environment,
            ),
            notifications: NotificationService::new(store, notifier),
            registry: JobRegistry::standard(),
            queue,
            event_log: None,
        }
    }

    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Run one job's business logic, without timeout or retry handling
    pub async fn execute(&self, job: &Job) -> Result<JsonValue> {
        let output = match job {
            Job::SyncConnection {
                connection_id,
                manual_sync,
            } => serde_json::to_value(self.sync.sync_connection(*connection_id, *manual_sync).await?)?,
            Job::SyncAccount {
                connection_id,
                bank_account_id,
                manual_sync,
                ..
            } => serde_json::to_value(
                self.accounts
                    .sync_account(*connection_id, *bank_account_id, *manual_sync)
                    .await?,
            )?,
            Job::UpsertTransactions {
                connection_id,
                bank_account_id,
                ..
            } => serde_json::to_value(
                self.upserter
                    .sync_account_transactions(*connection_id, *bank_account_id)
                    .await?,
            )?,
            Job::TransactionNotification {
                connection_id,
                since,
            } => {
                let count = self
                    .notifications
                    .notify_new_transactions(*connection_id, *since)
                    .await?;
                json!({ "newTransactions": count })
            }
            Job::ConnectionRecovery {
                connection_id,
                provider,
                retry_count,
            } => serde_json::to_value(
                self.recovery
                    .recover_connection(*connection_id, *provider, *retry_count)
                    .await?,
            )?,
            Job::ConnectionNotification(notification) => {
                self.notifications.deliver(notification).await?;
                json!({ "type": notification.notification_type })
            }
            Job::RefreshConnection { connection_id } => {
                serde_json::to_value(self.refresh.refresh_connection(*connection_id).await?)?
            }
            Job::SweepExpiring => {
                serde_json::to_value(self.expiration.sweep_expiring(Utc::now()).await?)?
            }
            Job::SweepDisconnected => {
                serde_json::to_value(self.expiration.sweep_disconnected(Utc::now()).await?)?
            }
            Job::SyncAll => json!({ "dispatched": self.sync.sync_all().await? }),
        };
        Ok(output)
    }

    /// Run one envelope with timeout, retry and event logging
    pub async fn handle(&self, envelope: JobEnvelope) -> JobReport {
        let span = tracing::info_span!(
            "job",
            job = envelope.job.name(),
            job_id = %envelope.id,
            attempt = envelope.attempt
        );
        let outcome = self.handle_inner(&envelope).instrument(span).await;
        JobReport {
            job: envelope.job.name(),
            attempt: envelope.attempt,
            outcome,
        }
    }

    async fn handle_inner(&self, envelope: &JobEnvelope) -> JobOutcome {
        let descriptor = match self.registry.get(envelope.job.name()) {
            Ok(d) => d.clone(),
            Err(e) => {
                error!(error = %e, "Refusing unregistered job");
                self.record(LogEvent::for_job(JOB_GAVE_UP, envelope).with_error(e.to_string()));
                return JobOutcome::GaveUp {
                    error: e.to_string(),
                    kind: e.kind(),
                };
            }
        };

        let result =
            match tokio::time::timeout(descriptor.max_duration, self.execute(&envelope.job)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(descriptor.max_duration.as_secs())),
            };

        let failure = match result {
            Ok(output) => {
                info!("Job succeeded");
                self.record(LogEvent::for_job(JOB_SUCCEEDED, envelope));
                return JobOutcome::Succeeded { output };
            }
            Err(e) => e,
        };

        warn!(error = %failure, kind = ?failure.kind(), "Job failed");
        self.record(LogEvent::for_job(JOB_FAILED, envelope).with_error(failure.to_string()));

        let policy = &descriptor.retry_policy;
        if let RetryDecision::RetryAfter { delay } = policy.decide(&failure, envelope.attempt) {
            match self.queue.enqueue(envelope.next_attempt(), delay).await {
                Ok(()) => {
                    info!(delay_secs = delay.as_secs(), "Retry scheduled");
                    self.record(
                        LogEvent::for_job(JOB_RETRY_SCHEDULED, envelope)
                            .with_error(failure.to_string())
                            .with_error_details(format!("retry in {}s", delay.as_secs())),
                    );
                    return JobOutcome::RetryScheduled {
                        error: failure.to_string(),
                        delay_secs: delay.as_secs(),
                    };
                }
                Err(e) => error!(error = %e, "Failed to enqueue retry"),
            }
        }

        let final_error = if policy.max_attempts > 1 && envelope.attempt >= policy.max_attempts {
            Error::RetriesExhausted {
                attempts: envelope.attempt,
                last_error: failure.to_string(),
            }
        } else {
            failure
        };
        error!(error = %final_error, "Giving up on job");
        self.record(LogEvent::for_job(JOB_GAVE_UP, envelope).with_error(final_error.to_string()));
        JobOutcome::GaveUp {
            error: final_error.to_string(),
            kind: final_error.kind(),
        }
    }

    fn record(&self, event: LogEvent) {
        if let Some(log) = &self.event_log {
            log.record(event);
        }
    }

    /// Process jobs until nothing is sleeping, queued or running
    pub async fn run_until_idle(&self, receiver: &mut JobReceiver) -> RunSummary {
        let mut summary = RunSummary::default();
        while receiver.pending() > 0 {
            let Some(envelope) = receiver.recv().await else {
                break;
            };
            let report = self.handle(envelope).await;
            receiver.complete();
            summary.add(report);
        }
        summary
    }

    /// Process jobs until `shutdown` resolves or the queue closes
    pub async fn run<F>(&self, receiver: &mut JobReceiver, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(pending = receiver.pending(), "Job runner stopping");
                    break;
                }
                next = receiver.recv() => {
                    let Some(envelope) = next else { break };
                    let report = self.handle(envelope).await;
                    receiver.complete();
                    summary.add(report);
                }
            }
        }
        summary
    }
}

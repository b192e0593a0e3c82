//! Job registry - the one place where every job type is declared
//!
//! The runner refuses jobs that are not listed here.

use std::time::Duration;

use crate::domain::result::{Error, Result};
use crate::services::retry::RetryPolicy;

const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(300);
const LONG_MAX_DURATION: Duration = Duration::from_secs(600);

/// Execution limits for one job type
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub name: &'static str,
    pub max_duration: Duration,
    pub retry_policy: RetryPolicy,
}

impl JobDescriptor {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            max_duration: DEFAULT_MAX_DURATION,
            retry_policy: RetryPolicy::default(),
        }
    }

    fn long_running(mut self) -> Self {
        self.max_duration = LONG_MAX_DURATION;
        self
    }

    fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

#[derive(Debug, Clone)]
pub struct JobRegistry {
    descriptors: Vec<JobDescriptor>,
}

impl JobRegistry {
    /// Every job the pipeline dispatches
    pub fn standard() -> Self {
        Self {
            descriptors: vec![
                JobDescriptor::new("sync-connection"),
                JobDescriptor::new("sync-account"),
                JobDescriptor::new("upsert-transactions"),
                JobDescriptor::new("transaction-notification"),
                // Recovery schedules its own follow-ups on failure
                JobDescriptor::new("connection-recovery"),
                JobDescriptor::new("connection-notification"),
                JobDescriptor::new("refresh-connection"),
                JobDescriptor::new("sweep-expiring")
                    .long_running()
                    .retry_policy(RetryPolicy::none()),
                JobDescriptor::new("sweep-disconnected")
                    .long_running()
                    .retry_policy(RetryPolicy::none()),
                JobDescriptor::new("sync-all")
                    .long_running()
                    .retry_policy(RetryPolicy::none()),
            ],
        }
    }

    /// Replace the retry policy of every descriptor
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        for descriptor in &mut self.descriptors {
            if descriptor.retry_policy.max_attempts > 1 {
                descriptor.retry_policy = policy.clone();
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Result<&JobDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::config(format!("Unregistered job: {}", name)))
    }

    pub fn descriptors(&self) -> &[JobDescriptor] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, Notification, NotificationType, Provider};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_every_job_is_registered() {
        let registry = JobRegistry::standard();
        let id = Uuid::new_v4();
        let jobs = [
            Job::SyncConnection { connection_id: id, manual_sync: true },
            Job::SyncAccount {
                connection_id: id,
                bank_account_id: id,
                manual_sync: true,
                user_id: id,
            },
            Job::UpsertTransactions {
                connection_id: id,
                bank_account_id: id,
                manual_sync: false,
            },
            Job::TransactionNotification { connection_id: id, since: Utc::now() },
            Job::ConnectionRecovery {
                connection_id: id,
                provider: Provider::Plaid,
                retry_count: 0,
            },
            Job::ConnectionNotification(Notification::new(
                id,
                NotificationType::ConnectionWarning,
                "t",
                "m",
            )),
            Job::RefreshConnection { connection_id: id },
            Job::SweepExpiring,
            Job::SweepDisconnected,
            Job::SyncAll,
        ];
        for job in jobs {
            assert!(registry.get(job.name()).is_ok(), "{} missing", job.name());
        }
        assert_eq!(registry.descriptors().len(), 10);
    }

    #[test]
    fn test_sweeps_get_longer_limits() {
        let registry = JobRegistry::standard();
        assert_eq!(
            registry.get("sync-account").unwrap().max_duration,
            Duration::from_secs(300)
        );
        for name in ["sweep-expiring", "sweep-disconnected", "sync-all"] {
            let descriptor = registry.get(name).unwrap();
            assert_eq!(descriptor.max_duration, Duration::from_secs(600));
            assert_eq!(descriptor.retry_policy.max_attempts, 1);
        }
    }

    #[test]
    fn test_unknown_job_is_config_error() {
        assert!(matches!(
            JobRegistry::standard().get("reticulate-splines"),
            Err(Error::Config(_))
        ));
    }
}

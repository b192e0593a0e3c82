//! Job retry policy
//!
//! Decides, from the error kind and attempt number, whether a failed job is
//! re-enqueued and after how long.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use crate::domain::result::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum RetryDecision {
    RetryAfter {
        #[serde(rename = "delay_secs", serialize_with = "as_secs")]
        delay: Duration,
    },
    GiveUp,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first run included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fixed wait after a provider rate limit
    pub rate_limit_delay: Duration,
    /// Fixed wait after a persistence failure
    pub persistence_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_delay: Duration::from_secs(300),
            persistence_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Run once, never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Decide what happens after `attempt` (1-based) failed with `error`
    pub fn decide(&self, error: &Error, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        match error.kind() {
            ErrorKind::NotFound
            | ErrorKind::ProviderAuthExpired
            | ErrorKind::ExhaustedRetries
            | ErrorKind::Fatal => RetryDecision::GiveUp,
            ErrorKind::SystemPersistence => RetryDecision::RetryAfter {
                delay: self.persistence_delay,
            },
            ErrorKind::ProviderTransient if error.is_rate_limited() => RetryDecision::RetryAfter {
                delay: self.rate_limit_delay,
            },
            ErrorKind::ProviderTransient => RetryDecision::RetryAfter {
                delay: self.backoff(attempt),
            },
        }
    }

    /// Exponential delay after `attempt` failures, capped at `max_delay`
    ///
    /// With jitter the result is drawn from `[d/2, d]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::ProviderError;

    fn transient() -> Error {
        ProviderError::transient("institution down").into()
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::default().without_jitter();
        let delays: Vec<u64> = (1..=8).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=10 {
            let full = policy.clone().without_jitter().backoff(attempt);
            for _ in 0..20 {
                let d = policy.backoff(attempt);
                assert!(d <= full);
                assert!(d >= full / 2);
            }
        }
    }

    #[test]
    fn test_transient_errors_retry_until_max_attempts() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(
            policy.decide(&transient(), 1),
            RetryDecision::RetryAfter {
                delay: Duration::from_secs(1)
            }
        );
        assert!(matches!(
            policy.decide(&transient(), 4),
            RetryDecision::RetryAfter { .. }
        ));
        assert_eq!(policy.decide(&transient(), 5), RetryDecision::GiveUp);
    }

    #[test]
    fn test_rate_limit_and_persistence_delays() {
        let policy = RetryPolicy::default();
        let limited: Error = ProviderError::rate_limited("slow down").into();
        assert_eq!(
            policy.decide(&limited, 1),
            RetryDecision::RetryAfter {
                delay: Duration::from_secs(300)
            }
        );
        assert_eq!(
            policy.decide(&Error::database("locked"), 2),
            RetryDecision::RetryAfter {
                delay: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_permanent_errors_give_up_immediately() {
        let policy = RetryPolicy::default();
        let expired: Error = ProviderError::login_required("login again").into();
        assert_eq!(policy.decide(&expired, 1), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(&Error::ConnectionNotFound("c1".into()), 1),
            RetryDecision::GiveUp
        );
        assert_eq!(policy.decide(&Error::validation("bad"), 1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_none_never_retries() {
        assert_eq!(RetryPolicy::none().decide(&transient(), 1), RetryDecision::GiveUp);
    }
}

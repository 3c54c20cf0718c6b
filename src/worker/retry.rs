//! Retry budget and backoff between failed attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::{MAX_ATTEMPTS, RETRY_BASE_DELAY, RETRY_MAX_DELAY};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per file, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: MAX_ATTEMPTS, base_delay: RETRY_BASE_DELAY, max_delay: RETRY_MAX_DELAY }
    }
}

impl RetryPolicy {
    /// Policy without delays.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("at least one upload attempt is required"));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::config("retry base delay exceeds the maximum delay"));
        }

        Ok(())
    }

    /// Whether `error` on attempt number `attempt` (1-based) warrants another try.
    #[inline]
    pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    /// Capped exponential backoff after `attempt` failed, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent).min(self.max_delay)
    }

    /// Backoff with equal jitter: somewhere in `[backoff / 2, backoff]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        let half = backoff / 2;
        let spread = u64::try_from((backoff - half).as_millis()).unwrap_or(u64::MAX);

        half + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(16));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_stays_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=6 {
            let backoff = policy.backoff(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay >= backoff / 2 && delay <= backoff, "{delay:?} outside {backoff:?}");
            }
        }
    }

    #[test]
    fn test_should_retry_respects_budget_and_kind() {
        let policy = RetryPolicy::immediate(3);
        let transient = Error::Transient("503".into());
        let rejected = Error::Rejected { status: 400, code: "bad_request".into(), message: String::new() };

        assert!(policy.should_retry(1, &transient));
        assert!(policy.should_retry(2, &transient));
        assert!(!policy.should_retry(3, &transient));
        assert!(!policy.should_retry(1, &rejected));
        assert_eq!(policy.delay(1), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(matches!(RetryPolicy::immediate(0).validate(), Err(Error::Configuration(_))));

        let inverted = RetryPolicy { base_delay: Duration::from_secs(5), max_delay: Duration::from_secs(1), ..RetryPolicy::default() };
        assert!(inverted.validate().is_err());
    }
}

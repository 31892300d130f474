// src/retry.rs
//! One retry/backoff policy for every annotation provider.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls per task, first call included. Always at least 1.
    max_attempts: u32,
    base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Linear growth: `base * attempt` after the `attempt`-th failed call (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(attempt.max(1))
    }

    /// Whether another call is allowed after `attempt` calls have failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(1500));
    }

    #[test]
    fn zero_attempts_means_one_call() {
        let p = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(p.max_attempts(), 1);
        assert!(!p.allows_retry_after(1));
    }

    #[test]
    fn retry_window() {
        let p = RetryPolicy::default();
        assert!(p.allows_retry_after(1));
        assert!(p.allows_retry_after(2));
        assert!(!p.allows_retry_after(3));
    }
}

//! Retry policy and injectable sleeping
//!
//! The engine sleeps between a command and its verification probe, and
//! again before each retry. Sleeping goes through a trait so retry tests
//! run without wall-clock waits.

use async_trait::async_trait;
use std::time::Duration;

/// Bounded in-place retry schedule for one remediation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; 3 means up to 4 attempts total
    pub max_retries: u32,
    /// Wait after sending a command before probing for recovery
    pub verification_grace: Duration,
    /// Base delay before a retry, scaled linearly by attempt number
    pub retry_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            verification_grace: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff * attempt.max(1)
    }
}

/// Injectable sleep, so tests can skip real delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test sleeper that returns immediately and records requested durations
#[derive(Default)]
pub struct InstantSleeper {
    pub requested: std::sync::Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut guard) = self.requested.lock() {
            guard.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_scales_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(15));
        // Attempt 0 is clamped rather than producing a zero delay.
        assert_eq!(policy.backoff_for(0), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_instant_sleeper_records_durations() {
        let sleeper = InstantSleeper::default();
        sleeper.sleep(Duration::from_secs(10)).await;
        sleeper.sleep(Duration::from_secs(5)).await;

        let requested = sleeper.requested.lock().unwrap();
        assert_eq!(*requested, vec![Duration::from_secs(10), Duration::from_secs(5)]);
    }
}

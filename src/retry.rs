//! Retry logic utilities for network operations
//!
//! Shared by the spend-proof oracle client and the explorer client: exponential
//! backoff with a cap, and a per-attempt timeout wrapper.

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;
use tokio::time::timeout;

use crate::config::{ExplorerConfig, OracleConfig};

/// Retry budget and backoff schedule for one remote service
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub timeout_seconds: u64,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
}

impl RetryPolicy {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Wait before the attempt that follows one which waited `current`
    ///
    /// Grows by `backoff_multiplier` and never exceeds `max_backoff_seconds`, so
    /// a long oracle outage settles on a fixed polling interval.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use covenant_token::config::OracleConfig;
    /// use covenant_token::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::from(&OracleConfig::default());
    /// assert_eq!(policy.next_backoff(policy.initial_backoff()), Duration::from_millis(400));
    /// ```
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let grown = current.as_millis() as f64 * self.backoff_multiplier;
        Duration::from_millis(grown as u64).min(Duration::from_secs(self.max_backoff_seconds))
    }

    /// Waits between consecutive attempts when every attempt fails
    pub fn schedule(&self) -> Vec<Duration> {
        let mut waits = Vec::with_capacity(self.max_retries.saturating_sub(1));
        let mut wait = self.initial_backoff();
        for _ in 1..self.max_retries {
            waits.push(wait);
            wait = self.next_backoff(wait);
        }
        waits
    }
}

impl From<&OracleConfig> for RetryPolicy {
    fn from(config: &OracleConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout_seconds: config.timeout_seconds,
            initial_backoff_ms: config.initial_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
            max_backoff_seconds: config.max_backoff_seconds,
        }
    }
}

impl From<&ExplorerConfig> for RetryPolicy {
    fn from(config: &ExplorerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout_seconds: config.timeout_seconds,
            initial_backoff_ms: config.initial_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
            max_backoff_seconds: config.max_backoff_seconds,
        }
    }
}

/// Run one attempt under a timeout
///
/// When the timeout elapses the attempt's future is dropped, so a late answer
/// from an abandoned attempt can never reach the caller.
pub async fn execute_with_timeout<T, F>(timeout_seconds: u64, attempt: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    timeout(Duration::from_secs(timeout_seconds), attempt).await
}

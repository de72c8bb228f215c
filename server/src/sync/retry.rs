//! Retry of transient remote failures with exponential backoff.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use bizsync_engine::Result;

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one; 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }
}

/// Retries spent during one run.
#[derive(Debug, Default)]
pub struct RetryStats {
    retries: AtomicU32,
}

impl RetryStats {
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }
}

/// Run `op`, retrying transient failures up to the policy's attempt limit.
///
/// Every other error, and the last transient one, is returned as is.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    stats: &RetryStats,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let schedule = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.base_delay)
        .with_multiplier(2.0)
        .with_randomization_factor(0.2)
        .with_max_interval(policy.max_delay)
        .with_max_elapsed_time(None)
        .build();

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    backoff::future::retry(schedule, || {
        attempt += 1;
        let current = attempt;
        let call = op();
        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(error) if error.is_retryable() && current < max_attempts => {
                    stats.record();
                    tracing::warn!(
                        call = label,
                        attempt = current,
                        max_attempts,
                        error = %error,
                        "transient remote failure, retrying"
                    );
                    Err(backoff::Error::transient(error))
                }
                Err(error) => Err(backoff::Error::permanent(error)),
            }
        }
    })
    .await
}

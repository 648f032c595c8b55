//! Retry with exponential backoff.
//!
//! [`retry_with_backoff`] wraps any async fallible operation. Errors are
//! classified through the [`Retryable`] trait:
//! - retryable (transport failures, non-2xx responses) → sleep and try again
//! - non-retryable (decode errors) → returned immediately
//!
//! Backoff: `base_delay * 2^k` after the k-th failure, i.e. 1s, 2s, 4s with
//! the default policy of 3 retries.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;

/// Error classification used by [`retry_with_backoff`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to retry and how long to wait before the first retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay slept after the failed attempt with zero-based index `attempt`.
    /// Saturates at `Duration::MAX`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
        )
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are exhausted. The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{}: attempt {} failed, retrying in {:?}: {}",
                    label,
                    attempt + 1,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

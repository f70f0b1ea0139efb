//! Call-site retry with a fixed attempt count and fixed delay

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tracing::debug;

use crate::Error;
use crate::config::RetryConfig;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether retries are enabled
    pub enabled: bool,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
        }
    }

    /// Single attempt, no retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn builder(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.backoff)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

/// Execute a future with retry logic
///
/// Only transport-level failures are retried. Denials, provider declines
/// and expired deadlines are returned after the first attempt.
///
/// # Errors
///
/// Returns the last error from `f` if all retry attempts are exhausted or
/// the error is not retryable.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut f = f;
    if !policy.enabled {
        return f().await;
    }

    f.retry(policy.builder())
        .when(is_retryable)
        .notify(|e: &Error, delay: Duration| {
            debug!(
                operation = name,
                delay_ms = delay.as_millis(),
                error = %e,
                "Retrying after backoff"
            );
        })
        .await
}

/// Check if an error is retryable
fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::Transport(_) | Error::Http(_) | Error::Io(_)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            enabled: true,
            max_attempts,
            backoff: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_up_to_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> = with_retry(&policy(3), "charge", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transport("connection reset".to_string()))
        })
        .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy(3), "charge", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Transport("timeout".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_declines_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> = with_retry(&policy(5), "charge", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::provider("stripe", "Your card was declined."))
        })
        .await;

        assert!(matches!(result, Err(Error::Provider { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let _ = with_retry(&policy(5), "refund", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::DeadlineExceeded("stripe refund".to_string()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_policy_makes_one_attempt() {
        let calls = AtomicU32::new(0);

        let _ = with_retry(&RetryPolicy::disabled(), "charge", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::Transport("down".to_string()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_in_config_still_means_one() {
        let policy = RetryPolicy::new(&RetryConfig {
            enabled: true,
            max_attempts: 0,
            backoff: Duration::ZERO,
        });
        assert_eq!(policy.max_attempts, 1);
    }
}

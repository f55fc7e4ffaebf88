//! Retry with exponential backoff for transient provider failures.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use cee_core::config::duration_human;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// Backoff settings for judge calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: usize,

    #[serde(with = "duration_human")]
    pub min_delay: Duration,

    #[serde(with = "duration_human")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Run `call`, retrying only errors that [`ProviderError::is_retryable`].
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, provider: &str, call: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    call.retry(config.backoff())
        .when(ProviderError::is_retryable)
        .notify(|err: &ProviderError, delay: Duration| {
            tracing::warn!(provider, error = %err, delay = ?delay, "Judge call failed, retrying");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_retries: usize) -> RetryConfig {
        RetryConfig {
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let attempts = &AtomicUsize::new(0);
        let result = with_retry(&fast(3), "mock", || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::RateLimited { retry_after: None })
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let attempts = &AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&fast(3), "mock", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::AuthError)
        })
        .await;

        assert!(matches!(result, Err(ProviderError::AuthError)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let attempts = &AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&fast(2), "mock", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::HttpError("connection reset".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}

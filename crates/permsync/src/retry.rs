//! Backoff for store writes.
//!
//! A permissions record that fails to save is retried a few times with an
//! exponential delay; after that the syncer gives up and re-enqueues the
//! subject instead of holding a worker.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Retries after the first failed write.
pub const STORE_RETRY_ATTEMPTS: usize = 3;

/// Delay before the first retry.
pub const STORE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on a single retry delay.
pub const STORE_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first attempt; 0 disables retrying.
    pub retries: usize,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: STORE_RETRY_BACKOFF,
            max_delay: STORE_RETRY_MAX_BACKOFF,
            retries: STORE_RETRY_ATTEMPTS,
            jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration, retries: usize) -> Self {
        Self {
            initial_delay,
            max_delay,
            retries,
            jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay.max(self.initial_delay))
            .with_max_times(self.retries);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Run `operation`, retrying the errors `is_retryable` accepts.
///
/// Every retry is logged at warn level under `label` (usually the subject).
/// Returns the last error once the retries are used up.
///
/// ```ignore
/// with_retry(
///     || store.save_permissions(record.clone()),
///     &RetryConfig::default(),
///     StoreError::is_retryable,
///     "user:7",
/// )
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut, P>(
    operation: F,
    config: &RetryConfig,
    is_retryable: P,
    label: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error,
    P: FnMut(&E) -> bool,
{
    let mut retry = 0usize;

    operation
        .retry(config.backoff())
        .when(is_retryable)
        .notify(|err: &E, delay: Duration| {
            retry += 1;
            tracing::warn!(
                subject = label,
                retry,
                of = config.retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Store write failed, retrying"
            );
        })
        .await
}

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{ChainCommunicationError, ChainResult};

/// Default number of attempts for transient failures.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 10;
/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How many times and how often an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub attempts: usize,
    /// Fixed sleep between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy with `attempts` tries separated by `delay`.
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Run `op` until it succeeds, the attempts are exhausted or `cancel` fires.
///
/// Cancellation is checked before each attempt and raced against each delay.
/// `on_retry` is called with the attempt number and the error before
/// sleeping.
pub async fn retry<T, F, Fut>(
    cancel: &CancellationToken,
    policy: RetryPolicy,
    mut op: F,
    mut on_retry: impl FnMut(usize, &ChainCommunicationError),
) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ChainCommunicationError::Cancelled);
        }
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= attempts || matches!(err, ChainCommunicationError::Cancelled) {
            return Err(err);
        }
        on_retry(attempt, &err);
        tokio::select! {
            _ = cancel.cancelled() => return Err(ChainCommunicationError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

/// `retry` with the default policy and a warning log on every failure.
pub async fn retry_logged<T, F, Fut>(
    cancel: &CancellationToken,
    what: &str,
    op: F,
) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    retry(cancel, RetryPolicy::default(), op, |attempt, error| {
        warn!(attempt, ?error, operation = what, "Retrying failed operation");
    })
    .await
}

//! Store calls from async code: run on the blocking pool, with bounded retry
//! of operations that lost a lock race.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use storyvault_store::{Store, StoreError};

/// How storage conflicts are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly after that.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy with `attempts` tries and the default backoff.
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Run a store call on the blocking thread pool.
///
/// `RocksStore` transactions wait on row locks for up to the configured lock
/// timeout and must not hold an async worker meanwhile.
pub fn run_blocking<T, F>(
    store: &Arc<dyn Store>,
    op: F,
) -> impl Future<Output = Result<T, StoreError>>
where
    T: Send + 'static,
    F: FnOnce(&dyn Store) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    async move {
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StoreError::Database(format!("store task failed: {e}")))?
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up.
///
/// Every store operation either commits fully or writes nothing, so running it
/// again after a conflict is safe.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                tracing::debug!(
                    operation,
                    attempt,
                    error = %e,
                    "Storage conflict, retrying"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

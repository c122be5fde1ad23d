//! A single retry combinator used uniformly by every external call site,
//! replacing the per-provider ad-hoc retry logic the design notes flag.

use crate::shared::errors::AppError;
use std::future::Future;
use std::time::Duration;

/// `max_attempts` total tries (including the first), exponential backoff
/// starting at `base_delay`, doubling each retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Default policy for metadata/HTTP calls: 3 retries, 2s base delay,
    /// per the concurrency & resource model.
    pub fn default_external() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_external()
    }
}

/// Run `op` up to `policy.max_attempts` times. Retries only when
/// `AppError::is_retryable()` is true; any non-retryable error or final
/// exhaustion propagates immediately. No silent fallback.
pub async fn retry_with_policy<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0u32;
    let mut delay = policy.base_delay;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                tracing::warn!(attempt, error = %e, "retrying after transient error");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result = retry_with_policy(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::ExternalTimeout("slow".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<(), AppError> =
            retry_with_policy(policy, || async { Err(AppError::RateLimited("slow down".into())) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<(), AppError> = retry_with_policy(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::ParseError("bad json".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

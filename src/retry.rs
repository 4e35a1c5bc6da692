//! Bounded retry for store calls that fail transiently.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::users::repo::StoreError;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            attempts: cfg.attempts.max(1),
            backoff: cfg.backoff(),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// Only [`StoreError::Transient`] is retried.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        error = %e,
                        attempt,
                        max = self.attempts,
                        what,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FAST: RetryPolicy = RetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(1),
    };

    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<u32, StoreError> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(StoreError::Transient(anyhow::anyhow!("reset #{n}")))
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        let calls = AtomicU32::new(0);
        let got = FAST.run("flaky", || flaky(&calls, 2)).await.unwrap();
        assert_eq!(got, 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let err = FAST.run("flaky", || flaky(&calls, 5)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let err = FAST
            .run("conflict", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::Conflict("email"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("email")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Retry logic with exponential backoff
//!
//! Network-bound operations (feed fetches, transcription calls) are wrapped
//! in [`with_retry`], which re-invokes them on failure with exponentially
//! growing delays. Every failure is retried; callers must not wrap
//! operations whose failures are definitionally fatal, such as bad
//! configuration. The backoff wait races the run's cancellation token so a
//! shutdown in progress is never stalled by a sleeping retry loop.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{CastnotesError, Result};

/// Bounded-attempt policy shared by every retried operation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay after a failed attempt (1-indexed): `base * 2^(attempt-1)`
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Execute an async operation, retrying every failure with exponential
/// backoff until the policy's attempts are exhausted.
///
/// The final error is wrapped so its message mentions the exhausted
/// retries. Cancellation during a backoff wait aborts the loop immediately
/// with [`CastnotesError::Interrupted`].
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        tracing::debug!(%label, attempt, "attempting operation");

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(%label, attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                tracing::warn!(%label, attempt, %error, "attempt failed");

                if attempt >= policy.max_attempts {
                    tracing::error!(
                        %label,
                        max_attempts = policy.max_attempts,
                        "max retries reached, aborting"
                    );
                    return Err(CastnotesError::MaxRetries {
                        attempts: policy.max_attempts,
                        source: Box::new(error),
                    });
                }

                let delay = policy.delay_after(attempt);
                tracing::debug!(%label, delay_ms = delay.as_millis() as u64, "retrying after backoff");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(CastnotesError::Interrupted),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 7,
            base_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_calls_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let cancel = CancellationToken::new();

        let result = with_retry(&fast_policy(), &cancel, "test", || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn success_on_attempt_k_calls_k_times() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let cancel = CancellationToken::new();

        let result = with_retry(&fast_policy(), &cancel, "test", || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 3 {
                    Err(CastnotesError::Feed("transient".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 4, "should succeed on attempt 4");
    }

    #[tokio::test]
    async fn always_failing_operation_is_invoked_exactly_seven_times() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let cancel = CancellationToken::new();

        let result = with_retry(&fast_policy(), &cancel, "test", || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CastnotesError::Feed("always down".into()))
            }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 7);
        let error = result.unwrap_err();
        assert!(
            error.to_string().contains("max retries"),
            "error should mention max retries, was: {error}"
        );
        assert!(error.to_string().contains("always down"), "source error preserved");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_double_between_attempts() {
        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
        };

        let _result = with_retry(&policy, &cancel, "test", || {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(tokio::time::Instant::now());
                Err::<i32, _>(CastnotesError::Feed("down".into()))
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 4, "initial attempt + 3 retries");

        // Gaps follow base * 2^(i-1): 1000ms, 2000ms, 4000ms
        for (i, expected_ms) in [(1usize, 1000u64), (2, 2000), (3, 4000)] {
            let gap = ts[i].duration_since(ts[i - 1]);
            assert_eq!(
                gap,
                Duration::from_millis(expected_ms),
                "gap between attempt {} and {} was {gap:?}",
                i,
                i + 1
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_shortcuts_an_in_progress_backoff() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = with_retry(&fast_policy(), &cancel, "test", || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CastnotesError::Feed("down".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(CastnotesError::Interrupted)));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "no further attempts once cancelled"
        );
    }
}

//! Retry logic with configurable backoff for collaborator calls made by stages.

use std::future::Future;
use std::time::Duration;

use contentflow_types::{ContentflowError, Result};

use crate::events::{EventEmitter, PipelineEvent};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt as u32));
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Delay before the next attempt, stretched to any server-requested wait.
fn delay_after(err: &ContentflowError, policy: &BackoffPolicy, attempt: usize) -> Duration {
    let delay = policy.delay_for_attempt(attempt);
    match err {
        ContentflowError::RateLimited { retry_after_ms, .. } if *policy != BackoffPolicy::None => {
            delay.max(Duration::from_millis(*retry_after_ms))
        }
        _ => delay,
    }
}

/// Call `f` up to `max_retries + 1` times, retrying errors that satisfy
/// [`ContentflowError::is_retryable`].
///
/// Non-retryable errors and the error of the final attempt are returned as is.
pub async fn execute_with_retry<T, F, Fut>(
    mut f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    stage: &str,
    emitter: &EventEmitter,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = delay_after(&e, policy, attempt);
                tracing::warn!(
                    stage = %stage,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retryable error, retrying"
                );
                emitter.emit(PipelineEvent::StageRetrying {
                    stage: stage.to_string(),
                    attempt: attempt + 1,
                    delay_ms: delay.as_millis() as u64,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rate_limited() -> ContentflowError {
        ContentflowError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 100,
        }
    }

    // 1. No retries needed, success on first try
    #[tokio::test]
    async fn success_on_first_try() {
        let result = execute_with_retry(
            || async { Ok("done") },
            3,
            &BackoffPolicy::None,
            "stage_a",
            &EventEmitter::default(),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
    }

    // 2. Retry on retryable error succeeds on second try
    #[tokio::test]
    async fn retry_on_retryable_error_succeeds() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        let result = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(rate_limited())
                    } else {
                        Ok(42)
                    }
                }
            },
            3,
            &BackoffPolicy::None,
            "stage_b",
            &emitter,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        match rx.recv().await.unwrap() {
            PipelineEvent::StageRetrying { stage, attempt, .. } => {
                assert_eq!(stage, "stage_b");
                assert_eq!(attempt, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // 3. Max retries exhausted returns the last error
    #[tokio::test]
    async fn max_retries_exhausted() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let result: Result<()> = execute_with_retry(
            move || {
                cc.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            },
            2,
            &BackoffPolicy::None,
            "stage_c",
            &EventEmitter::default(),
        )
        .await;

        assert!(matches!(result.unwrap_err(), ContentflowError::RateLimited { .. }));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    // 4. Non-retryable error is returned immediately without retrying
    #[tokio::test]
    async fn non_retryable_error_no_retry() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let result: Result<()> = execute_with_retry(
            move || {
                cc.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ContentflowError::GenerationParseError {
                        target: "tweet".into(),
                        message: "not json".into(),
                    })
                }
            },
            5,
            &BackoffPolicy::None,
            "stage_d",
            &EventEmitter::default(),
        )
        .await;

        assert!(matches!(result.unwrap_err(), ContentflowError::GenerationParseError { .. }));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    // 5. Fixed backoff returns constant delay
    #[test]
    fn fixed_backoff_constant_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_millis(200));
    }

    // 6. Exponential backoff doubles correctly and respects max
    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_millis(500));
    }

    // 7. Default backoff is exponential from 500ms up to 30s
    #[test]
    fn default_backoff_is_exponential() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(30));
    }

    // 8. Rate limits stretch the delay to the requested wait
    #[test]
    fn rate_limit_extends_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(10));
        assert_eq!(delay_after(&rate_limited(), &policy, 0), Duration::from_millis(100));
        assert_eq!(delay_after(&rate_limited(), &BackoffPolicy::None, 0), Duration::ZERO);
    }
}

use std::future::Future;
use std::time::Duration;

use crate::error::{RequestError, RetryError};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::transport";

use crate::{log_debug, log_warn};

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
pub const FRAME_DELIVERY_ATTEMPTS: u32 = 3;

/// Attempt budget and pacing for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Per-attempt limit.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn frame_delivery(timeout: Duration) -> Self {
        Self {
            max_attempts: FRAME_DELIVERY_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            timeout,
        }
    }

    /// Lifecycle and history calls are not retried.
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            backoff_base: DEFAULT_BACKOFF_BASE,
            timeout,
        }
    }

    /// Wait after the failed attempt `attempt_index` (0-based):
    /// `backoff_base * 2^attempt_index`.
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds or the policy's attempts are spent. Each attempt
/// is bounded by `policy.timeout`; the last failure is returned.
pub async fn send_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_index = 0;

    loop {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout(policy.timeout)),
        };

        let err = match outcome {
            Ok(value) => {
                if attempt_index > 0 {
                    log_debug!("{label} succeeded on attempt {}", attempt_index + 1);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt_index + 1 >= max_attempts {
            return Err(RetryError {
                label,
                attempts: attempt_index + 1,
                last: err,
            });
        }

        let wait = policy.backoff(attempt_index);
        log_warn!(
            "{label} attempt {}/{} failed: {err}; retrying in {}ms",
            attempt_index + 1,
            max_attempts,
            wait.as_millis()
        );
        tokio::time::sleep(wait).await;
        attempt_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::frame_delivery(Duration::from_secs(2))
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(40), Duration::from_millis(500).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn third_attempt_success_waits_full_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = send_with_retry(&policy(), "process_frame", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RequestError::Network("connection refused".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_surface_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = send_with_retry(&policy(), "process_frame", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(RequestError::Status {
                    code: 500 + n as u16,
                    body: String::new(),
                })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(
            err.last,
            RequestError::Status {
                code: 502,
                body: String::new()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_counts_as_timeout() {
        let policy = RetryPolicy::single_attempt(Duration::from_millis(100));

        let result: Result<(), _> = send_with_retry(&policy, "stop_detection", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.last, RequestError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_does_not_wait() {
        let started = Instant::now();
        let result: Result<(), _> =
            send_with_retry(&RetryPolicy::single_attempt(Duration::from_secs(1)), "history", || async {
                Err(RequestError::Decode("not json".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}

//! Bounded exponential-backoff retrier.
//!
//! Retries only transient failures (timeout, transport, retryable HTTP
//! statuses). Delay is `min(base × 2^attempt, cap)` plus 10% jitter so a
//! fleet of workers does not thunder back in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::errors::Result;

/// Retry knobs. `max_attempts` counts the first try.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based), jittered.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.cap);
        let jitter = rand::thread_rng().gen_range(0.0..=0.1);
        capped.mul_f64(1.0 + jitter)
    }
}

/// Runs `op` up to `policy.max_attempts` times. The closure receives the
/// 0-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                debug!(
                    backend = %e.backend_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = %e.kind.code(),
                    "transient failure, backing off"
                );
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
    use crate::errors::{BackendError, ErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&fast_policy(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BackendError::new("b", ErrorKind::Timeout, "slow"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let err = with_retry::<u8, _, _>(&fast_policy(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::new("b", ErrorKind::AuthDenied, "nope")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let err = with_retry::<u8, _, _>(&fast_policy(), |_| async {
            Err(BackendError::new("b", ErrorKind::Http(503), "busy"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Http(503));
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(4),
        };
        // 2^6 seconds would be 64s; the cap plus max jitter bounds it.
        assert!(p.delay(6) <= Duration::from_secs(5));
    }
}

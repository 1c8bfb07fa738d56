//! Per-backend circuit breaker.
//!
//! States: closed → open after K consecutive failures; open → half-open
//! after the cooldown; half-open → closed on one success, back to open on
//! any failure. While open, calls fail fast with `CircuitOpen` and the
//! adapter is never touched.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::errors::{BackendError, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Gate before calling the adapter.
    ///
    /// # Errors
    /// [`ErrorKind::CircuitOpen`] while the circuit is open and the
    /// cooldown has not elapsed.
    pub fn check(&self, backend_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    info!(backend = backend_id, "circuit half-open, probing");
                    Ok(())
                } else {
                    Err(BackendError::new(
                        backend_id,
                        ErrorKind::CircuitOpen,
                        format!("circuit open for another {:?}", self.cooldown - elapsed),
                    ))
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn on_failure(&self, backend_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(backend = backend_id, "probe failed, circuit re-opened");
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        backend = backend_id,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(cb.check("b").is_ok());
        cb.on_failure("b");
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.on_failure("b");
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.check("b").unwrap_err().kind, ErrorKind::CircuitOpen);
    }

    #[test]
    fn success_resets_the_failure_run() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        cb.on_failure("b");
        cb.on_success();
        cb.on_failure("b");
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_after_cooldown_then_closes_on_success() {
        let cb = CircuitBreaker::new(1, Duration::ZERO);
        cb.on_failure("b");
        assert_eq!(cb.state(), BreakerState::Open);
        // Zero cooldown: next check transitions to half-open.
        assert!(cb.check("b").is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.on_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::ZERO);
        cb.on_failure("b");
        assert!(cb.check("b").is_ok());
        cb.on_failure("b");
        assert_eq!(cb.state(), BreakerState::Open);
    }
}

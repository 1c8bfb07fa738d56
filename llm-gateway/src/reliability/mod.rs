//! Reliability layer wrapping every adapter.
//!
//! Composition, outer to inner:
//! cost check → circuit breaker → rate limiter → retrier → adapter.

pub mod breaker;
pub mod cost;
pub mod rate_limit;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use cost::{CostCaps, CostSnapshot, CostTracker, estimate_cost};
pub use rate_limit::RateLimiter;
pub use retry::{RetryPolicy, with_retry};

use std::time::Duration;

/// Consecutive failures before a backend's circuit opens.
pub const BREAKER_THRESHOLD: u32 = 3;
/// How long an open circuit stays closed to traffic.
pub const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

/// Per-backend reliability state: one limiter and one breaker, shared
/// across repos for the process lifetime.
#[derive(Debug)]
pub struct BackendGuards {
    pub limiter: RateLimiter,
    pub breaker: CircuitBreaker,
}

impl BackendGuards {
    pub fn new(rpm_limit: u32, tpm_limit: u32) -> Self {
        Self {
            limiter: RateLimiter::new(rpm_limit, tpm_limit),
            breaker: CircuitBreaker::new(BREAKER_THRESHOLD, BREAKER_COOLDOWN),
        }
    }
}

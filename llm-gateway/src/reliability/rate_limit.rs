//! Per-backend token-bucket rate limiter with two dimensions:
//! requests-per-minute and tokens-per-minute.
//!
//! `acquire` never sleeps itself; it returns the delay the caller must
//! wait, keeping the critical section short. The bucket may run into debt
//! when actual token usage exceeds the estimate; the drift is absorbed on
//! the following refills.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Two-dimensional token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Bucket>,
    /// Requests refilled per second.
    req_rate: f64,
    /// Tokens refilled per second.
    tok_rate: f64,
    /// Burst ceilings (one minute worth).
    req_burst: f64,
    tok_burst: f64,
}

#[derive(Debug)]
struct Bucket {
    requests: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rpm_limit: u32, tpm_limit: u32) -> Self {
        let req_burst = rpm_limit.max(1) as f64;
        let tok_burst = tpm_limit.max(1) as f64;
        Self {
            state: Mutex::new(Bucket {
                requests: req_burst,
                tokens: tok_burst,
                last_refill: Instant::now(),
            }),
            req_rate: req_burst / 60.0,
            tok_rate: tok_burst / 60.0,
            req_burst,
            tok_burst,
        }
    }

    /// Reserves one request and `estimated_tokens`; returns how long the
    /// caller must sleep before issuing it.
    pub fn acquire(&self, estimated_tokens: u64) -> Duration {
        let mut b = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut b);

        let need_tok = estimated_tokens as f64;
        let wait_req = if b.requests >= 1.0 {
            0.0
        } else {
            (1.0 - b.requests) / self.req_rate
        };
        let wait_tok = if b.tokens >= need_tok {
            0.0
        } else {
            (need_tok - b.tokens) / self.tok_rate
        };

        // Reserve now; debt is paid back by future refills.
        b.requests -= 1.0;
        b.tokens -= need_tok;

        Duration::from_secs_f64(wait_req.max(wait_tok))
    }

    /// Reconciles the reservation against actual usage.
    pub fn record(&self, estimated_tokens: u64, actual_tokens: u64) {
        let mut b = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Give back over-estimates, charge under-estimates.
        b.tokens += estimated_tokens as f64 - actual_tokens as f64;
        b.tokens = b.tokens.min(self.tok_burst);
    }

    fn refill(&self, b: &mut Bucket) {
        let elapsed = b.last_refill.elapsed().as_secs_f64();
        b.last_refill = Instant::now();
        b.requests = (b.requests + elapsed * self.req_rate).min(self.req_burst);
        b.tokens = (b.tokens + elapsed * self.tok_rate).min(self.tok_burst);
    }
}

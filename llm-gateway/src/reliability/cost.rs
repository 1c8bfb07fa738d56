//! Daily and monthly cost caps.
//!
//! Totals are summed over wall-clock UTC windows and reset when the day
//! or month rolls over. `check` denies before the adapter is touched, so
//! a denied call spends nothing. Per-backend totals ride along for the
//! health endpoint.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use crate::errors::{BackendError, ErrorKind, Result};
use crate::request::ProviderKind;

/// USD per 1k tokens (input, output) by provider family. Local models are
/// free; remote defaults sit at small-model price points.
fn rate_per_1k(kind: ProviderKind) -> (f64, f64) {
    match kind {
        ProviderKind::LocalHttp => (0.0, 0.0),
        ProviderKind::OpenAiCompat => (0.000_15, 0.000_6),
        ProviderKind::Anthropic => (0.003, 0.015),
        ProviderKind::GoogleGenAi => (0.000_125, 0.000_375),
    }
}

/// Estimated or actual USD cost of a call.
pub fn estimate_cost(kind: ProviderKind, input_tokens: u64, output_tokens: u64) -> f64 {
    let (inp, out) = rate_per_1k(kind);
    (input_tokens as f64 / 1000.0) * inp + (output_tokens as f64 / 1000.0) * out
}

/// Budget ceilings, USD.
#[derive(Debug, Clone, Copy)]
pub struct CostCaps {
    pub daily_usd: f64,
    pub monthly_usd: f64,
}

#[derive(Debug, Default)]
struct Totals {
    day: Option<(i32, u32, u32)>,
    day_usd: f64,
    month: Option<(i32, u32)>,
    month_usd: f64,
    per_backend: HashMap<String, f64>,
}

/// Process-wide spend tracker shared by every backend.
#[derive(Debug)]
pub struct CostTracker {
    caps: CostCaps,
    totals: Mutex<Totals>,
}

/// Snapshot for health reporting.
#[derive(Debug, Clone)]
pub struct CostSnapshot {
    pub day_usd: f64,
    pub month_usd: f64,
    pub per_backend: Vec<(String, f64)>,
}

impl CostTracker {
    pub fn new(caps: CostCaps) -> Self {
        Self {
            caps,
            totals: Mutex::new(Totals::default()),
        }
    }

    /// Denies when either window would cross its cap.
    pub fn check(&self, backend_id: &str, estimated_usd: f64) -> Result<()> {
        self.check_at(backend_id, estimated_usd, Utc::now())
    }

    pub fn check_at(
        &self,
        backend_id: &str,
        estimated_usd: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut t = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        roll(&mut t, now);

        if t.day_usd + estimated_usd > self.caps.daily_usd {
            warn!(
                backend = backend_id,
                spent = t.day_usd,
                cap = self.caps.daily_usd,
                "daily cost cap would be exceeded"
            );
            return Err(BackendError::new(
                backend_id,
                ErrorKind::BudgetExceeded,
                format!(
                    "daily cap {:.4} USD reached (spent {:.4})",
                    self.caps.daily_usd, t.day_usd
                ),
            ));
        }
        if t.month_usd + estimated_usd > self.caps.monthly_usd {
            return Err(BackendError::new(
                backend_id,
                ErrorKind::BudgetExceeded,
                format!(
                    "monthly cap {:.4} USD reached (spent {:.4})",
                    self.caps.monthly_usd, t.month_usd
                ),
            ));
        }
        Ok(())
    }

    /// Books actual spend after the response arrived.
    pub fn record(&self, backend_id: &str, actual_usd: f64) {
        self.record_at(backend_id, actual_usd, Utc::now());
    }

    pub fn record_at(&self, backend_id: &str, actual_usd: f64, now: DateTime<Utc>) {
        let mut t = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        roll(&mut t, now);
        t.day_usd += actual_usd;
        t.month_usd += actual_usd;
        *t.per_backend.entry(backend_id.to_string()).or_default() += actual_usd;
    }

    pub fn snapshot(&self) -> CostSnapshot {
        let t = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        CostSnapshot {
            day_usd: t.day_usd,
            month_usd: t.month_usd,
            per_backend: t.per_backend.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

fn roll(t: &mut Totals, now: DateTime<Utc>) {
    let today = (now.year(), now.month(), now.day());
    if t.day != Some(today) {
        t.day = Some(today);
        t.day_usd = 0.0;
    }
    let this_month = (now.year(), now.month());
    if t.month != Some(this_month) {
        t.month = Some(this_month);
        t.month_usd = 0.0;
        t.per_backend.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn caps() -> CostCaps {
        CostCaps {
            daily_usd: 0.01,
            monthly_usd: 1.0,
        }
    }

    #[test]
    fn denies_when_daily_cap_would_be_crossed() {
        let tracker = CostTracker::new(caps());
        let now = Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap();

        tracker.check_at("b", 0.008, now).unwrap();
        tracker.record_at("b", 0.008, now);

        let err = tracker.check_at("b", 0.008, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BudgetExceeded);
    }

    #[test]
    fn day_boundary_resets_the_daily_window() {
        let tracker = CostTracker::new(caps());
        let today = Utc.with_ymd_and_hms(2026, 7, 30, 23, 0, 0).unwrap();
        tracker.record_at("b", 0.009, today);
        assert!(tracker.check_at("b", 0.005, today).is_err());

        let tomorrow = Utc.with_ymd_and_hms(2026, 7, 31, 1, 0, 0).unwrap();
        assert!(tracker.check_at("b", 0.005, tomorrow).is_ok());
    }

    #[test]
    fn monthly_cap_holds_across_days() {
        let tracker = CostTracker::new(CostCaps {
            daily_usd: 10.0,
            monthly_usd: 0.01,
        });
        let d1 = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        tracker.record_at("b", 0.009, d1);
        let d2 = Utc.with_ymd_and_hms(2026, 7, 2, 0, 0, 0).unwrap();
        assert!(tracker.check_at("b", 0.005, d2).is_err());

        let next_month = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        assert!(tracker.check_at("b", 0.005, next_month).is_ok());
    }

    #[test]
    fn local_models_cost_nothing() {
        assert_eq!(estimate_cost(ProviderKind::LocalHttp, 10_000, 10_000), 0.0);
        assert!(estimate_cost(ProviderKind::Anthropic, 1000, 1000) > 0.0);
    }
}

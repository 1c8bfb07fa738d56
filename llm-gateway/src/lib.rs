//! Uniform gateway to local and remote model backends.
//!
//! - Construct once, wrap in `Arc`, pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - Every call is wrapped by the reliability layer, composed outer to
//!   inner: cost check → circuit breaker → rate limiter → retrier → adapter.
//! - Adapters themselves never retry and never sleep.

pub mod errors;
pub mod providers;
pub mod reliability;
pub mod request;

pub use errors::{BackendError, ErrorKind, Result};
pub use providers::BackendClient;
pub use reliability::{
    BackendGuards, BreakerState, CostCaps, CostSnapshot, CostTracker, RetryPolicy, estimate_cost,
};
pub use request::{
    BackendConfig, EnrichmentFields, EnrichmentRequest, EnrichmentResponse, ProviderKind,
    TaskKind,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::reliability::with_retry;

/// Shared gateway over all configured backends.
pub struct Gateway {
    cost: Arc<CostTracker>,
    retry: RetryPolicy,
    guards: Mutex<HashMap<String, Arc<BackendGuards>>>,
    clients: RwLock<HashMap<ClientKey, Arc<BackendClient>>>,
}

impl Gateway {
    pub fn new(caps: CostCaps) -> Self {
        Self::with_retry_policy(caps, RetryPolicy::default())
    }

    pub fn with_retry_policy(caps: CostCaps, retry: RetryPolicy) -> Self {
        info!(
            daily_cap = caps.daily_usd,
            monthly_cap = caps.monthly_usd,
            max_attempts = retry.max_attempts,
            "gateway initialized"
        );
        Self {
            cost: Arc::new(CostTracker::new(caps)),
            retry,
            guards: Mutex::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Shared cost tracker, for health reporting and router bookkeeping.
    pub fn cost_tracker(&self) -> Arc<CostTracker> {
        self.cost.clone()
    }

    /// Breaker state of one backend, for health reporting.
    pub fn breaker_state(&self, backend_id: &str) -> Option<BreakerState> {
        let guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        guards.get(backend_id).map(|g| g.breaker.state())
    }

    /// One reliability-wrapped enrichment call against one backend.
    ///
    /// # Errors
    /// - [`ErrorKind::BudgetExceeded`] before anything else runs.
    /// - [`ErrorKind::CircuitOpen`] while the breaker is open.
    /// - Whatever the adapter surfaced once retries are exhausted.
    pub async fn enrich(
        &self,
        cfg: &BackendConfig,
        req: &EnrichmentRequest,
    ) -> Result<EnrichmentResponse> {
        let est_tokens = req.estimated_tokens();
        let est_cost = estimate_cost(cfg.kind, est_tokens, 512);

        // Outer to inner: cost → breaker → limiter → retrier → adapter.
        self.cost.check(&cfg.id, est_cost)?;

        let guards = self.guards_for(cfg);
        guards.breaker.check(&cfg.id)?;

        let delay = guards.limiter.acquire(est_tokens);
        if !delay.is_zero() {
            debug!(backend = %cfg.id, delay_ms = delay.as_millis() as u64, "rate limited");
            tokio::time::sleep(delay).await;
        }

        let client = self.client_for(cfg).await?;
        let started = Instant::now();
        let result = with_retry(&self.retry, |_attempt| {
            let client = client.clone();
            async move { client.enrich(req).await }
        })
        .await;

        match &result {
            Ok(resp) => {
                guards.breaker.on_success();
                let actual = resp.input_tokens + resp.output_tokens;
                guards.limiter.record(est_tokens, actual);
                self.cost.record(
                    &cfg.id,
                    estimate_cost(cfg.kind, resp.input_tokens, resp.output_tokens),
                );
                info!(
                    backend = %cfg.id,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "enrichment completed"
                );
            }
            Err(e) => {
                guards.limiter.record(est_tokens, 0);
                if e.kind != ErrorKind::CircuitOpen && e.kind != ErrorKind::BudgetExceeded {
                    guards.breaker.on_failure(&cfg.id);
                }
            }
        }
        result
    }

    /// One reliability-wrapped embedding call. Embeddings bypass the cost
    /// tracker (local/no-charge path) but share the breaker and limiter.
    pub async fn embed(&self, cfg: &BackendConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let est_tokens: u64 = texts.iter().map(|t| (t.len() as u64 / 4).max(8)).sum();

        let guards = self.guards_for(cfg);
        guards.breaker.check(&cfg.id)?;

        let delay = guards.limiter.acquire(est_tokens);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let client = self.client_for(cfg).await?;
        let result = with_retry(&self.retry, |_attempt| {
            let client = client.clone();
            async move { client.embed(texts).await }
        })
        .await;

        match &result {
            Ok(_) => guards.breaker.on_success(),
            Err(e) => {
                if e.kind != ErrorKind::CircuitOpen {
                    guards.breaker.on_failure(&cfg.id);
                }
            }
        }
        guards.limiter.record(est_tokens, est_tokens);
        result
    }

    /* --------------------- internals --------------------- */

    fn guards_for(&self, cfg: &BackendConfig) -> Arc<BackendGuards> {
        let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        guards
            .entry(cfg.id.clone())
            .or_insert_with(|| Arc::new(BackendGuards::new(cfg.rpm_limit, cfg.tpm_limit)))
            .clone()
    }

    async fn client_for(&self, cfg: &BackendConfig) -> Result<Arc<BackendClient>> {
        let key = ClientKey::from(cfg);

        if let Some(cli) = self.clients.read().await.get(&key).cloned() {
            debug!(backend = %cfg.id, "client cache hit");
            return Ok(cli);
        }

        debug!(backend = %cfg.id, "client cache miss (initializing)");
        let built = Arc::new(BackendClient::new(cfg.clone())?);
        let mut w = self.clients.write().await;
        let cli = w.entry(key).or_insert(built);
        Ok(cli.clone())
    }
}

/// Resolves a backend credential from the environment variable named in
/// provider configuration. Empty values count as missing.
pub fn resolve_api_key(env_name: &str) -> Option<String> {
    std::env::var(env_name).ok().filter(|v| !v.trim().is_empty())
}

/// Internal cache key to identify unique client configs.
///
/// The api key participates so clients with different credentials stay
/// isolated; the key's fields are never logged.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    kind: ProviderKind,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_ms: u128,
}

impl From<&BackendConfig> for ClientKey {
    fn from(cfg: &BackendConfig) -> Self {
        Self {
            kind: cfg.kind,
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout_ms: cfg.timeout.as_millis(),
        }
    }
}

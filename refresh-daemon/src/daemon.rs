//! The multi-repo refresh scheduler.
//!
//! Wakes on a fixed cadence, ranks registered repos by staleness, and
//! runs `incremental_sync → embed_batch → enrich_batch` for each due repo
//! under its write lock. Parallel across repos (bounded pool, rejected
//! oversubscription), single writer within a repo.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use llm_gateway::{CostCaps, Gateway, ProviderKind};
use llmc_config::LlmcConfig;
use enrichment_router::{GatewayInvoker, Router};
use rag_search::{Embedder, GatewayEmbeddings, ModelId};
use repo_indexer::{IndexerConfig, RepoIndexer};
use services::{CancelToken, LockError, RepoLock, WorkerPool, paths};
use span_store::{IndexStatus, SpanStore};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{DaemonError, Result};
use crate::failures::FailureStore;
use crate::registry::{Registry, RepoEntry};
use crate::state::{HealthReport, RepoHealth, ServiceState};

/// Spans embedded per repo per pass.
const EMBED_LIMIT: usize = 256;
/// Spans enriched per repo per pass.
const ENRICH_LIMIT: usize = 32;

/// Long-running refresh service over the registry.
pub struct RefreshDaemon {
    cfg: LlmcConfig,
    registry: Registry,
    failures: Arc<FailureStore>,
    gateway: Arc<Gateway>,
    pool: WorkerPool,
    state: Arc<Mutex<ServiceState>>,
    /// Repos whose store failed integrity checks; excluded from writes.
    unhealthy: Arc<Mutex<HashSet<String>>>,
    last_refresh: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl RefreshDaemon {
    pub fn new(cfg: LlmcConfig, registry: Registry, failures: FailureStore) -> Self {
        let gateway = Arc::new(Gateway::new(CostCaps {
            daily_usd: cfg.enrichment.daily_cost_cap_usd,
            monthly_usd: cfg.enrichment.monthly_cost_cap_usd,
        }));
        let pool = WorkerPool::new(cfg.daemon.max_parallel_repos);
        Self {
            cfg,
            registry,
            failures: Arc::new(failures),
            gateway,
            pool,
            state: Arc::new(Mutex::new(ServiceState::default())),
            unhealthy: Arc::new(Mutex::new(HashSet::new())),
            last_refresh: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Main loop. Returns once `cancel` fires and active repos reached a
    /// safe point (bounded by the shutdown grace period).
    pub async fn run(self: Arc<Self>, cancel: CancelToken) {
        let interval = Duration::from_secs(self.cfg.daemon.interval_seconds);
        info!(
            interval_secs = self.cfg.daemon.interval_seconds,
            parallel = self.pool.capacity(),
            "refresh daemon started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.clone().tick(&cancel).await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        // Stop scheduling; give active repos their grace period.
        let grace = Duration::from_secs(self.cfg.daemon.shutdown_grace_seconds);
        let deadline = tokio::time::Instant::now() + grace;
        while self.pool.available() < self.pool.capacity()
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("refresh daemon stopped");
    }

    /// One scheduling pass: pick due repos by staleness and dispatch.
    #[instrument(skip_all)]
    pub async fn tick(self: Arc<Self>, cancel: &CancelToken) {
        let entries = match self.registry.list() {
            Ok(e) => e,
            Err(e) => {
                error!(error = %e, "cannot read registry");
                return;
            }
        };

        let interval = chrono::Duration::seconds(self.cfg.daemon.interval_seconds as i64);
        let now = Utc::now();

        // Stalest first.
        let mut due: Vec<(RepoEntry, chrono::Duration)> = {
            let last = self.last_refresh.lock().unwrap_or_else(|e| e.into_inner());
            entries
                .into_iter()
                .map(|e| {
                    let staleness = last
                        .get(&e.id)
                        .map(|t| now - *t)
                        .unwrap_or(chrono::Duration::MAX);
                    (e, staleness)
                })
                .filter(|(_, staleness)| *staleness >= interval)
                .collect()
        };
        due.sort_by(|a, b| b.1.cmp(&a.1));

        for (entry, _) in due {
            if cancel.is_cancelled() {
                return;
            }
            if self
                .unhealthy
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&entry.id)
            {
                debug!(repo = %entry.id, "skipping unhealthy repo");
                continue;
            }

            let daemon = self.clone();
            let job_cancel = cancel.clone();
            let submitted = self.pool.try_submit(async move {
                daemon.refresh_repo(entry, &job_cancel).await;
            });
            if submitted.is_err() {
                // Pool full: backpressure, remaining repos wait for the
                // next tick.
                debug!("worker pool full, deferring remaining repos");
                break;
            }
        }
    }

    /// Refreshes one repo under its write lock.
    #[instrument(skip_all, fields(repo = %entry.id))]
    async fn refresh_repo(&self, entry: RepoEntry, cancel: &CancelToken) {
        self.set_active(&entry.id, true);
        let outcome = self.refresh_repo_inner(&entry, cancel).await;
        self.set_active(&entry.id, false);

        match outcome {
            Ok(()) => {
                self.last_refresh
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(entry.id.clone(), Utc::now());
            }
            Err(DaemonError::Lock(LockError::Timeout { .. })) => {
                // Another writer held the repo; skip this pass.
                warn!(repo = %entry.id, "write lock contended, skipping pass");
            }
            Err(e) => {
                error!(repo = %entry.id, error = %e, "refresh pass failed");
                if let Err(rec) = self.failures.record(&entry.id, "refresh", &e.to_string()) {
                    error!(error = %rec, "cannot record failure");
                }
                let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
                state.last_error = Some(format!("{}: {e}", entry.id));

                if is_corruption(&e) {
                    self.unhealthy
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(entry.id.clone());
                    error!(repo = %entry.id, "store corruption, repo marked unhealthy");
                }
            }
        }
    }

    async fn refresh_repo_inner(&self, entry: &RepoEntry, cancel: &CancelToken) -> Result<()> {
        let workspace = paths::workspace_dir(&entry.root);
        let lock = RepoLock::for_workspace(&workspace)?;
        let _guard = lock
            .acquire(Duration::from_secs(self.cfg.daemon.lock_wait_seconds))
            .await?;

        let indexer = self.build_indexer(entry)?;

        self.set_pass(&entry.id, "incremental_sync");
        let sync = indexer.incremental_sync(cancel).await?;
        debug!(
            repo = %entry.id,
            indexed = sync.files_indexed,
            removed = sync.files_removed,
            "sync done"
        );

        self.set_pass(&entry.id, "embed_batch");
        let embedded = indexer.embed_batch(EMBED_LIMIT, cancel).await?;

        self.set_pass(&entry.id, "enrich_batch");
        let enriched = indexer.enrich_batch(ENRICH_LIMIT, cancel).await?;
        if enriched.over_budget {
            info!(repo = %entry.id, "enrichment paused until the next budget window");
        }

        if indexer.needs_consistency_scan() {
            let removed = indexer.consistency_scan()?;
            warn!(repo = %entry.id, removed, "consistency scan completed");
        }

        info!(
            repo = %entry.id,
            embedded,
            enriched = enriched.enriched,
            failed = enriched.failed,
            deferred = enriched.deferred,
            "refresh pass complete"
        );
        Ok(())
    }

    /// Assembles the per-repo pipeline from configuration. Also the entry
    /// point front ends use for one-shot operations (full index, reset).
    pub fn build_indexer(&self, entry: &RepoEntry) -> Result<RepoIndexer> {
        let workspace = paths::workspace_dir(&entry.root);

        let store = SpanStore::open(
            &span_store::db_path(&workspace),
            self.cfg.store.failure_threshold,
            self.cfg.enrichment.retain_history,
        )
        .map_err(|e| {
            if e.is_corruption() {
                self.unhealthy
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(entry.id.clone());
                DaemonError::Unhealthy(entry.id.clone())
            } else {
                DaemonError::Store(e)
            }
        })?;

        let embedder = self.build_embedder()?;
        let model_id = embedder.model().as_str();

        let router = Router::from_config(
            &self.cfg.enrichment,
            Arc::new(GatewayInvoker::new(
                self.gateway.clone(),
                self.cfg.enrichment.providers.clone(),
            )),
        );

        Ok(RepoIndexer::new(
            entry.root.clone(),
            span_store::status_path(&workspace),
            Arc::new(store),
            Arc::new(embedder),
            Arc::new(router),
            IndexerConfig {
                slicer: code_slicer_config(&self.cfg, entry.domain),
                ignore_patterns: self.cfg.rag.ignore_patterns.clone(),
                model_id,
                pending_weights: self.cfg.store.pending_weights.clone(),
                cooldown_seconds: self.cfg.store.cooldown_seconds,
                ..IndexerConfig::default()
            },
        ))
    }

    /// Read-only retrieval facade for one repo. This is the search entry
    /// point front ends call; it never takes the write lock.
    pub fn searcher_for(&self, entry: &RepoEntry) -> Result<rag_search::Searcher> {
        let workspace = paths::workspace_dir(&entry.root);
        let store = SpanStore::open(
            &span_store::db_path(&workspace),
            self.cfg.store.failure_threshold,
            self.cfg.enrichment.retain_history,
        )?;
        let embedder = self.build_embedder()?;

        Ok(rag_search::Searcher::new(
            Arc::new(store),
            Arc::new(embedder),
            span_store::status_path(&workspace),
            span_store::graph_path(&workspace),
            rag_search::SearchConfig {
                max_stale_files: self.cfg.rag.max_stale_files as u64,
                ..rag_search::SearchConfig::default()
            },
        ))
    }

    /// Health check: per-repo status plus aggregate counters.
    pub fn health(&self) -> Result<HealthReport> {
        let mut report = HealthReport {
            state: self
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            ..HealthReport::default()
        };

        let unhealthy = self
            .unhealthy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for entry in self.registry.list()? {
            let workspace = paths::workspace_dir(&entry.root);
            let status = IndexStatus::read(&span_store::status_path(&workspace))?;
            if let Some(s) = &status {
                report.files_total += s.files_total;
                report.spans_total += s.spans_total;
                report.embeddings_total += s.embeddings_total;
                report.enrichments_total += s.enrichments_total;
                report.pending_total += s.pending;
                report.poisoned_total += s.poisoned;
            }
            report.repos.push(RepoHealth {
                healthy: !unhealthy.contains(&entry.id),
                failure_count: self.failures.count_for(&entry.id)?,
                id: entry.id,
                root: entry.root,
                status,
            });
        }

        report.recent_failures = self.failures.recent(20)?;
        Ok(report)
    }

    /* --------------------------- internals --------------------------- */

    /// Embedder over the configured embedding backend, shared shape for
    /// the indexer pipeline and the searcher facade.
    fn build_embedder(&self) -> Result<Embedder> {
        let model = ModelId::parse(&self.cfg.rag.embedding_model)?;
        let limits = self
            .cfg
            .enrichment
            .providers
            .get(&self.cfg.rag.embedding_provider)
            .cloned()
            .unwrap_or_default();
        let kind = ProviderKind::parse(&self.cfg.rag.embedding_provider)
            .unwrap_or(ProviderKind::LocalHttp);

        Ok(Embedder::new(
            Arc::new(GatewayEmbeddings::new(
                self.gateway.clone(),
                llm_gateway::BackendConfig {
                    id: format!("{}/{}", self.cfg.rag.embedding_provider, model.name),
                    kind,
                    model: model.name.clone(),
                    base_url: self.cfg.rag.embedding_url.clone(),
                    api_key: limits
                        .api_key_env
                        .as_deref()
                        .and_then(llm_gateway::resolve_api_key),
                    timeout: Duration::from_secs(60),
                    rpm_limit: limits.rpm_limit,
                    tpm_limit: limits.tpm_limit,
                },
            )),
            model,
        ))
    }

    fn set_active(&self, repo_id: &str, active: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if active {
            state.active_repos.push(repo_id.to_string());
        } else {
            state.active_repos.retain(|r| r != repo_id);
            state.current_pass = None;
        }
    }

    fn set_pass(&self, repo_id: &str, pass: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current_pass = Some(format!("{repo_id}: {pass}"));
    }
}

fn code_slicer_config(
    cfg: &LlmcConfig,
    domain: crate::registry::RepoDomain,
) -> code_slicer::SlicerConfig {
    code_slicer::SlicerConfig {
        enforce_clean_text: cfg.rag.enforce_clean_text,
        domain: domain_family(domain),
        ..code_slicer::SlicerConfig::default()
    }
}

/// Maps the registry domain tag onto the slicer's family taxonomy, so a
/// repo registered as `medical` routes its prose through the `medical`
/// chain.
fn domain_family(domain: crate::registry::RepoDomain) -> code_slicer::SliceFamily {
    use crate::registry::RepoDomain;
    match domain {
        RepoDomain::Code => code_slicer::SliceFamily::Code,
        RepoDomain::Docs => code_slicer::SliceFamily::Docs,
        RepoDomain::Medical => code_slicer::SliceFamily::Medical,
        RepoDomain::Other => code_slicer::SliceFamily::Other,
    }
}

fn is_corruption(e: &DaemonError) -> bool {
    match e {
        DaemonError::Store(s) => s.is_corruption(),
        DaemonError::Index(repo_indexer::IndexError::Store(s)) => s.is_corruption(),
        _ => false,
    }
}

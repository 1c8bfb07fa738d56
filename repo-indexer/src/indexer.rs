//! Per-repo indexing orchestrator.
//!
//! Drives the pipeline `discovering → slicing → storing → embedding →
//! enriching` over one repo. The caller holds the repo write lock for
//! every mutating operation; the orchestrator checks the cancellation
//! token between files and between batches.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use code_slicer::SlicerConfig;
use enrichment_router::Router;
use rag_search::Embedder;
use services::CancelToken;
use sha2::{Digest, Sha256};
use span_store::{IndexStatus, SpanStore, StoreError};
use tracing::{debug, info, instrument, warn};

use crate::discover::{DiscoveredFile, discover};
use crate::errors::{IndexError, Result};
use crate::state::IndexPhase;

/// Status record is flushed every this many files during indexing.
const FLUSH_EVERY: usize = 50;
/// Texts per embedding call.
const EMBED_CHUNK: usize = 16;

/// Orchestrator knobs, assembled from configuration by the daemon.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub slicer: SlicerConfig,
    pub ignore_patterns: Vec<String>,
    /// Active embedding model identifier (`name:dim`).
    pub model_id: String,
    /// Pending-work weighting (family → weight).
    pub pending_weights: std::collections::BTreeMap<String, u32>,
    pub cooldown_seconds: u64,
    /// Capacity of the slice → store channel. A full channel blocks the
    /// slicing producer cooperatively, throttling file I/O to what the
    /// store can absorb.
    pub channel_capacity: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            slicer: SlicerConfig::default(),
            ignore_patterns: Vec::new(),
            model_id: String::from("nomic-embed-text:768"),
            pending_weights: std::collections::BTreeMap::new(),
            cooldown_seconds: 0,
            channel_capacity: 8,
        }
    }
}

/// Outcome of a full or incremental pass.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_removed: usize,
    pub spans_added: usize,
    pub spans_removed: usize,
}

/// Outcome of one enrichment batch.
#[derive(Debug, Clone, Default)]
pub struct EnrichSummary {
    pub enriched: usize,
    pub failed: usize,
    pub deferred: usize,
    /// Set when the cost tracker denied the batch; the daemon pauses
    /// enrichment until the next budget window.
    pub over_budget: bool,
}

/// One sliced file in flight between the slicing and storing stages.
struct SlicedFile {
    file: DiscoveredFile,
    content_hash: String,
    outcome: code_slicer::FileSlices,
}

/// One repo's indexing pipeline.
pub struct RepoIndexer {
    root: PathBuf,
    status_path: PathBuf,
    store: Arc<SpanStore>,
    embedder: Arc<Embedder>,
    router: Arc<Router>,
    cfg: IndexerConfig,
    phase: Mutex<IndexPhase>,
    needs_consistency_scan: AtomicBool,
}

impl RepoIndexer {
    pub fn new(
        root: PathBuf,
        status_path: PathBuf,
        store: Arc<SpanStore>,
        embedder: Arc<Embedder>,
        router: Arc<Router>,
        cfg: IndexerConfig,
    ) -> Self {
        Self {
            root,
            status_path,
            store,
            embedder,
            router,
            cfg,
            phase: Mutex::new(IndexPhase::Idle),
            needs_consistency_scan: AtomicBool::new(false),
        }
    }

    /// Current pipeline phase, for the health check.
    pub fn phase(&self) -> IndexPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: IndexPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Walks the whole repo and (re)indexes every eligible file.
    #[instrument(skip_all, fields(repo = %self.root.display()))]
    pub async fn full_index(&self, cancel: &CancelToken) -> Result<SyncSummary> {
        self.set_phase(IndexPhase::Discovering);
        let files = discover(&self.root, &self.cfg.ignore_patterns)?;
        let summary = self.index_files(&files, cancel).await;
        self.set_phase(IndexPhase::Idle);
        let mut summary = summary?;
        summary.files_seen = files.len();

        self.flush_status(|s| {
            s.last_full_index_utc = Some(Utc::now());
            s.stale_files = 0;
        })?;
        info!(
            files = summary.files_seen,
            spans_added = summary.spans_added,
            "full index complete"
        );
        Ok(summary)
    }

    /// Diffs file metadata against the store; only files whose content
    /// hash changed are re-sliced, vanished files cascade out.
    #[instrument(skip_all, fields(repo = %self.root.display()))]
    pub async fn incremental_sync(&self, cancel: &CancelToken) -> Result<SyncSummary> {
        self.set_phase(IndexPhase::Discovering);
        let on_disk = discover(&self.root, &self.cfg.ignore_patterns)?;
        let known = self.store.list_files()?;

        let known_by_path: std::collections::HashMap<&str, &span_store::FileRecord> =
            known.iter().map(|f| (f.path.as_str(), f)).collect();

        // Changed or new files re-slice; unchanged mtimes fast-skip.
        let mut todo: Vec<DiscoveredFile> = Vec::new();
        for f in &on_disk {
            match known_by_path.get(f.rel_path.as_str()) {
                Some(existing) if existing.mtime == f.mtime => {}
                _ => todo.push(f.clone()),
            }
        }

        // Vanished files cascade.
        let on_disk_set: std::collections::HashSet<&str> =
            on_disk.iter().map(|f| f.rel_path.as_str()).collect();
        let mut removed = 0usize;
        for f in &known {
            if !on_disk_set.contains(f.path.as_str()) {
                self.store.delete_file(f.id)?;
                removed += 1;
            }
        }

        let mut summary = self.index_files(&todo, cancel).await?;
        summary.files_seen = on_disk.len();
        summary.files_removed = removed;
        self.set_phase(IndexPhase::Idle);

        self.flush_status(|s| {
            s.last_incremental_utc = Some(Utc::now());
            s.stale_files = 0;
        })?;
        debug!(
            seen = summary.files_seen,
            indexed = summary.files_indexed,
            removed,
            "incremental sync complete"
        );
        Ok(summary)
    }

    /// Embeds spans lacking a vector under the active model.
    #[instrument(skip_all, fields(repo = %self.root.display(), limit))]
    pub async fn embed_batch(&self, limit: usize, cancel: &CancelToken) -> Result<usize> {
        self.set_phase(IndexPhase::Embedding);
        let items = self
            .store
            .spans_missing_embedding(&self.cfg.model_id, limit)?;
        let mut written = 0usize;

        for chunk in items.chunks(EMBED_CHUNK) {
            if cancel.is_cancelled() {
                self.set_phase(IndexPhase::Idle);
                return Err(IndexError::Cancelled);
            }
            let texts: Vec<String> = chunk.iter().map(|w| w.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "embedding batch failed, deferring");
                    break;
                }
            };
            for (item, vector) in chunk.iter().zip(vectors) {
                match self
                    .store
                    .write_embedding(&item.span_hash, &self.cfg.model_id, &vector)
                {
                    Ok(()) => written += 1,
                    Err(StoreError::UnknownSpan(hash)) => {
                        warn!(span = %hash, "span vanished mid-batch, scheduling scan");
                        self.needs_consistency_scan.store(true, Ordering::Relaxed);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.set_phase(IndexPhase::Idle);
        self.flush_status(|_| {})?;
        Ok(written)
    }

    /// Pulls weighted pending work and runs it through the router.
    #[instrument(skip_all, fields(repo = %self.root.display(), limit))]
    pub async fn enrich_batch(&self, limit: usize, cancel: &CancelToken) -> Result<EnrichSummary> {
        self.set_phase(IndexPhase::Enriching);
        let items = self.store.pending_enrichments(
            limit,
            self.cfg.cooldown_seconds,
            &self.cfg.pending_weights,
            Utc::now(),
        )?;

        let mut summary = EnrichSummary::default();
        for item in items {
            if cancel.is_cancelled() {
                self.set_phase(IndexPhase::Idle);
                return Err(IndexError::Cancelled);
            }

            let outcome = self.router.enrich(&item).await;
            if let Some(decision) = &outcome.decision {
                self.store.write_routing_decision(decision)?;
            }

            match outcome.result {
                Ok(enriched) => {
                    match self.store.write_enrichment(
                        &item.span_hash,
                        &enriched.body,
                        &enriched.chain,
                        enriched.tier,
                        &enriched.provider,
                        &enriched.model,
                        Utc::now(),
                    ) {
                        Ok(()) => summary.enriched += 1,
                        Err(StoreError::UnknownSpan(hash)) => {
                            warn!(span = %hash, "span vanished mid-batch, scheduling scan");
                            self.needs_consistency_scan.store(true, Ordering::Relaxed);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) if e.is_over_budget() => {
                    warn!(span = %item.span_hash, error = %e, "budget window exhausted");
                    summary.over_budget = true;
                    break;
                }
                Err(e) if e.counts_as_span_failure() => {
                    let reason = e
                        .backend_kind()
                        .map(|k| k.code())
                        .unwrap_or_else(|| String::from("error"));
                    let chain = e.chain().unwrap_or(&item.family).to_string();
                    let count =
                        self.store.record_failure(&item.span_hash, &chain, &reason)?;
                    debug!(span = %item.span_hash, count, reason, "span failure recorded");
                    summary.failed += 1;
                }
                Err(e) => {
                    // Retryable exhaustion (including circuit-open across
                    // the chain): deferred, not failed permanently.
                    debug!(span = %item.span_hash, error = %e, "enrichment deferred");
                    summary.deferred += 1;
                }
            }
        }

        self.set_phase(IndexPhase::Idle);
        self.flush_status(|_| {})?;
        Ok(summary)
    }

    /// Removes orphan rows after a referential inconsistency. The daemon
    /// calls this when [`RepoIndexer::needs_consistency_scan`] reports
    /// true.
    pub fn consistency_scan(&self) -> Result<usize> {
        let removed = self.store.integrity_sweep()?;
        self.needs_consistency_scan.store(false, Ordering::Relaxed);
        Ok(removed)
    }

    pub fn needs_consistency_scan(&self) -> bool {
        self.needs_consistency_scan.load(Ordering::Relaxed)
    }

    /// Counts files changed on disk since the last sync without touching
    /// the store; feeds the freshness gate between passes.
    pub fn count_stale_files(&self) -> Result<u64> {
        let on_disk = discover(&self.root, &self.cfg.ignore_patterns)?;
        let known = self.store.list_files()?;
        let known_by_path: std::collections::HashMap<&str, i64> =
            known.iter().map(|f| (f.path.as_str(), f.mtime)).collect();

        let mut stale = 0u64;
        for f in &on_disk {
            match known_by_path.get(f.rel_path.as_str()) {
                Some(mtime) if *mtime == f.mtime => {}
                _ => stale += 1,
            }
        }
        let on_disk_set: std::collections::HashSet<&str> =
            on_disk.iter().map(|f| f.rel_path.as_str()).collect();
        stale += known
            .iter()
            .filter(|f| !on_disk_set.contains(f.path.as_str()))
            .count() as u64;
        Ok(stale)
    }

    /// Writes the stale-file count into the status record (used by the
    /// daemon between passes, without re-indexing).
    pub fn publish_staleness(&self) -> Result<u64> {
        let stale = self.count_stale_files()?;
        self.flush_status(|s| s.stale_files = stale)?;
        Ok(stale)
    }

    /* --------------------------- internals --------------------------- */

    /// Slices files on the blocking pool and writes through the store,
    /// connected by a bounded channel: a slow store backpressures the
    /// slicing producer instead of buffering unboundedly.
    async fn index_files(
        &self,
        files: &[DiscoveredFile],
        cancel: &CancelToken,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        if files.is_empty() {
            return Ok(summary);
        }
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let (tx, mut rx) =
            tokio::sync::mpsc::channel::<SlicedFile>(self.cfg.channel_capacity.max(1));

        // Producer: read + slice, one file at a time, off the reactor.
        let producer_files = files.to_vec();
        let slicer_cfg = self.cfg.slicer.clone();
        let producer_cancel = cancel.clone();
        let producer = tokio::spawn(async move {
            for file in producer_files {
                if producer_cancel.is_cancelled() {
                    return Ok::<_, IndexError>(());
                }
                let bytes = std::fs::read(&file.abs_path)?;
                let content_hash = {
                    let mut h = Sha256::new();
                    h.update(&bytes);
                    format!("{:x}", h.finalize())
                };

                let rel = file.rel_path.clone();
                let cfg = slicer_cfg.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    code_slicer::slice_file(&rel, &bytes, &cfg)
                })
                .await??;

                // Blocks cooperatively when the store is behind.
                if tx
                    .send(SlicedFile {
                        file,
                        content_hash,
                        outcome,
                    })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
            Ok(())
        });

        // Consumer: store writes, sequential (single writer per repo).
        self.set_phase(IndexPhase::Slicing);
        let mut processed = 0usize;
        while let Some(sliced) = rx.recv().await {
            if cancel.is_cancelled() {
                drop(rx);
                let _ = producer.await;
                return Err(IndexError::Cancelled);
            }

            self.set_phase(IndexPhase::Storing);
            let dropped_reason = sliced.outcome.dropped.first().map(|d| d.reason.clone());
            let file_id = self.store.upsert_file(
                &sliced.file.rel_path,
                sliced.outcome.language.tag(),
                sliced.file.mtime,
                &sliced.content_hash,
                dropped_reason.as_deref(),
            )?;
            let diff = self.store.replace_spans(file_id, &sliced.outcome.slices)?;

            summary.files_indexed += 1;
            summary.spans_added += diff.added.len();
            summary.spans_removed += diff.removed;

            processed += 1;
            if processed % FLUSH_EVERY == 0 {
                self.flush_status(|_| {})?;
            }
            self.set_phase(IndexPhase::Slicing);
        }

        producer.await??;
        Ok(summary)
    }

    fn flush_status(&self, mutate: impl FnOnce(&mut IndexStatus)) -> Result<()> {
        let mut status = IndexStatus::read(&self.status_path)?
            .unwrap_or_else(|| {
                IndexStatus::new(&self.root.to_string_lossy(), &self.cfg.model_id)
            });
        status.model_id = self.cfg.model_id.clone();
        status.apply_counters(self.store.counters()?);
        mutate(&mut status);
        status.write(&self.status_path)?;
        Ok(())
    }
}

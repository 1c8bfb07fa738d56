//! Hybrid search: lexical + vector candidates, RRF fusion, graph
//! expansion, budgeted MMR selection, and the freshness gate.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use span_store::{IndexStatus, SpanRecord, SpanStore};
use tracing::{debug, instrument, warn};

use crate::budget::{Candidate, select_under_budget};
use crate::embedder::{Embedder, dot};
use crate::errors::{Result, SearchError};
use crate::expand::SymbolGraph;
use crate::fuse::reciprocal_rank_fusion;
use crate::lexical::{LexicalIndex, tokenize};

/// Ranker knobs. Defaults match the documented algorithm.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Lexical candidate pool size (K₁).
    pub lexical_k: usize,
    /// Vector candidate pool size (K₂).
    pub vector_k: usize,
    /// Hits whose 1-hop neighbors are considered.
    pub graph_top_r: usize,
    /// Freshness gate threshold.
    pub max_stale_files: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_k: 200,
            vector_k: 200,
            graph_top_r: 10,
            max_stale_files: 25,
        }
    }
}

/// Optional result filters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Only spans under this repo-relative path prefix.
    pub path_prefix: Option<String>,
    /// Only spans of this family (`code`, `docs`, ...).
    pub family: Option<String>,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct Hit {
    pub span_hash: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub lexical_score: f64,
    pub vector_score: f64,
    /// Normalized 0–100; 100 is the batch top.
    pub score: f64,
    /// Enrichment summary when one exists.
    pub summary: Option<String>,
    /// 0 for direct hits, 1 for graph-expanded neighbors.
    pub graph_hops: u32,
}

/// Search outcome; an empty `hits` is a real answer, not an error.
#[derive(Debug, Clone, Default)]
pub struct SearchReply {
    pub hits: Vec<Hit>,
}

/// Read-only retrieval facade over one repo's store.
pub struct Searcher {
    store: Arc<SpanStore>,
    embedder: Arc<Embedder>,
    status_path: PathBuf,
    graph_path: PathBuf,
    cfg: SearchConfig,
}

impl Searcher {
    pub fn new(
        store: Arc<SpanStore>,
        embedder: Arc<Embedder>,
        status_path: PathBuf,
        graph_path: PathBuf,
        cfg: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            status_path,
            graph_path,
            cfg,
        }
    }

    /// Runs a query under a character budget (0 = unlimited).
    ///
    /// # Errors
    /// [`SearchError::StaleIndex`] when more files are pending re-index
    /// than the configured threshold. Refusing beats misleading.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub async fn search(
        &self,
        query: &str,
        budget_chars: usize,
        filters: &SearchFilters,
    ) -> Result<SearchReply> {
        // Freshness gate first.
        if let Some(status) = IndexStatus::read(&self.status_path)? {
            if status.stale_files > self.cfg.max_stale_files {
                return Err(SearchError::StaleIndex {
                    pending: status.stale_files,
                });
            }
        }

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(SearchReply::default());
        }

        let spans = self.filtered_spans(filters)?;
        if spans.is_empty() {
            return Ok(SearchReply::default());
        }
        let by_hash: HashMap<&str, &SpanRecord> =
            spans.iter().map(|s| (s.span_hash.as_str(), s)).collect();

        // Channel 1: lexical.
        let lexical_index = LexicalIndex::build(&spans);
        let lexical: Vec<(String, f64)> = lexical_index
            .top_k(&query_tokens, self.cfg.lexical_k)
            .into_iter()
            .map(|(i, score)| (spans[i].span_hash.clone(), score))
            .collect();

        // Channel 2: vectors. A dead embedding backend degrades to
        // lexical-only retrieval instead of failing the query.
        let vector = match self.vector_candidates(query, &by_hash).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "vector channel unavailable, lexical only");
                Vec::new()
            }
        };

        debug!(
            lexical = lexical.len(),
            vector = vector.len(),
            pool = spans.len(),
            "candidates gathered"
        );

        // Fuse, then optionally expand over the symbol graph.
        let mut fused = reciprocal_rank_fusion(&lexical, &vector, &query_tokens, |hash| {
            by_hash.get(hash).map(|s| s.path.clone())
        });
        let mut hops: HashMap<String, u32> = HashMap::new();
        let graph = SymbolGraph::load(&self.graph_path)?;
        graph.expand(&mut fused, &mut hops, self.cfg.graph_top_r);

        // Budgeted MMR selection.
        let candidates: Vec<Candidate> = fused
            .iter()
            .filter_map(|f| {
                let span = by_hash.get(f.span_hash.as_str())?;
                let identifiers: HashSet<String> = span
                    .identifiers
                    .iter()
                    .flat_map(|i| tokenize(i))
                    .collect();
                Some(Candidate {
                    span_hash: f.span_hash.clone(),
                    score: f.fused,
                    cost: span.text.len(),
                    identifiers,
                })
            })
            .collect();
        let selected = select_under_budget(candidates, budget_chars);
        let selected_set: HashSet<&str> = selected.iter().map(String::as_str).collect();

        // Normalize against the batch top and assemble hits.
        let top = fused.first().map(|f| f.fused).unwrap_or(0.0);
        let mut hits = Vec::new();
        for f in &fused {
            if !selected_set.contains(f.span_hash.as_str()) {
                continue;
            }
            let Some(span) = by_hash.get(f.span_hash.as_str()) else {
                continue;
            };
            let summary = self
                .store
                .current_enrichment(&f.span_hash)?
                .map(|e| e.body.summary);
            hits.push(Hit {
                span_hash: f.span_hash.clone(),
                path: span.path.clone(),
                start_line: span.start_line,
                end_line: span.end_line,
                lexical_score: f.lexical_score,
                vector_score: f.vector_score,
                score: if top > 0.0 { f.fused / top * 100.0 } else { 0.0 },
                summary,
                graph_hops: hops.get(&f.span_hash).copied().unwrap_or(0),
            });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.span_hash.cmp(&b.span_hash)));

        Ok(SearchReply { hits })
    }

    fn filtered_spans(&self, filters: &SearchFilters) -> Result<Vec<SpanRecord>> {
        let mut spans = self.store.all_spans()?;
        if let Some(prefix) = &filters.path_prefix {
            spans.retain(|s| s.path.starts_with(prefix.as_str()));
        }
        if let Some(family) = &filters.family {
            spans.retain(|s| &s.family == family);
        }
        Ok(spans)
    }

    async fn vector_candidates(
        &self,
        query: &str,
        pool: &HashMap<&str, &SpanRecord>,
    ) -> Result<Vec<(String, f64)>> {
        let query_vecs = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_vec) = query_vecs.first() else {
            return Ok(Vec::new());
        };

        let model_id = self.embedder.model().as_str();
        let mut scored: Vec<(String, f64)> = self
            .store
            .all_embeddings(&model_id)?
            .into_iter()
            .filter(|(hash, _)| pool.contains_key(hash.as_str()))
            .map(|(hash, vector)| {
                let score = dot(query_vec, &vector) as f64;
                (hash, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.cfg.vector_k);
        Ok(scored)
    }
}

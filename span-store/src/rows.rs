//! Record types stored and returned by the span store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    /// Repo-relative path, canonical form.
    pub path: String,
    pub language: String,
    /// Modification time, seconds since epoch.
    pub mtime: i64,
    /// Content hash of the whole file (hex SHA-256).
    pub content_hash: String,
    /// Set when the slicer dropped content from this file (e.g.
    /// `unclean_text`).
    pub dropped_reason: Option<String>,
}

/// Span row as the ranker and orchestrator see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub id: i64,
    pub file_id: i64,
    pub path: String,
    pub span_hash: String,
    pub kind: String,
    /// Weighting/routing family: `code`, `docs`, `config`, `other`.
    pub family: String,
    pub sub_language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub identifiers: Vec<String>,
}

/// Outcome of a `replace_spans` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanDiff {
    /// Hashes newly inserted; these need embedding and enrichment.
    pub added: Vec<String>,
    /// Hashes preserved with their embedding/enrichment rows intact.
    pub kept: usize,
    /// Hashes removed (cascaded).
    pub removed: usize,
}

/// Structured enrichment payload for one span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentBody {
    pub summary: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub pitfalls: Vec<String>,
    pub tags: Vec<String>,
}

/// Stored enrichment row, including its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub span_hash: String,
    pub body: EnrichmentBody,
    pub chain: String,
    pub tier: u8,
    pub provider: String,
    pub model: String,
    pub completed_utc: DateTime<Utc>,
}

/// One backend attempt inside a routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend_id: String,
    pub attempt_index: u32,
    /// Outcome code (`success`, `timeout`, `circuit_open`, `auth_denied`, ...).
    pub outcome: String,
    pub latency_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Per-enrichment audit record. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub span_hash: String,
    pub slice_kind: String,
    pub chain: String,
    /// Terminal outcome of the whole chain.
    pub outcome: String,
    pub total_duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub attempts: Vec<AttemptRecord>,
    pub decided_utc: DateTime<Utc>,
}

/// Pending enrichment work item handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub span_hash: String,
    pub path: String,
    pub kind: String,
    pub family: String,
    pub sub_language: String,
    pub text: String,
    pub identifiers: Vec<String>,
}

/// Failure-tracking row; `count >= threshold` means poisoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub span_hash: String,
    pub chain: String,
    pub reason: String,
    pub count: u32,
    pub last_seen_utc: DateTime<Utc>,
}

/// Aggregate counters for health checks and the status file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreCounters {
    pub files_total: u64,
    pub spans_total: u64,
    pub embeddings_total: u64,
    pub enrichments_total: u64,
    pub pending: u64,
    pub poisoned: u64,
}

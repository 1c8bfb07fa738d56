//! Service state and health reporting types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use span_store::IndexStatus;

use crate::failures::PassFailure;

/// Mutable daemon state, exposed through the health check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceState {
    /// Repos currently being refreshed.
    pub active_repos: Vec<String>,
    /// Human-readable description of the current pass.
    pub current_pass: Option<String>,
    /// Last pass-level error observed.
    pub last_error: Option<String>,
}

/// Health view of one repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoHealth {
    pub id: String,
    pub root: PathBuf,
    /// False once the store failed integrity checks; writes are refused.
    pub healthy: bool,
    /// Freshness record, when one exists.
    pub status: Option<IndexStatus>,
    /// Pass failures recorded for this repo.
    pub failure_count: u64,
}

/// Aggregate health snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub repos: Vec<RepoHealth>,
    pub files_total: u64,
    pub spans_total: u64,
    pub embeddings_total: u64,
    pub enrichments_total: u64,
    pub pending_total: u64,
    pub poisoned_total: u64,
    pub recent_failures: Vec<PassFailure>,
    pub state: ServiceState,
}

//! Freshness record: `rag_index_status.json`.
//!
//! Written atomically (write-then-rename) so readers never observe a
//! half-written file, and the ranker's freshness gate can trust it.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::rows::StoreCounters;
use crate::schema::SCHEMA_VERSION;

/// Index status as exposed to the ranker, the daemon, and front ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Canonical repo root.
    pub repo: String,
    pub last_full_index_utc: Option<DateTime<Utc>>,
    pub last_incremental_utc: Option<DateTime<Utc>>,
    pub files_total: u64,
    pub spans_total: u64,
    pub embeddings_total: u64,
    pub enrichments_total: u64,
    pub pending: u64,
    pub poisoned: u64,
    /// Files known to have changed on disk since the last sync; drives
    /// the freshness gate.
    pub stale_files: u64,
    /// Active embedding model identifier.
    pub model_id: String,
    pub schema_version: i64,
}

impl IndexStatus {
    /// Fresh status for a repo that has never been indexed.
    pub fn new(repo: &str, model_id: &str) -> Self {
        Self {
            repo: repo.to_string(),
            last_full_index_utc: None,
            last_incremental_utc: None,
            files_total: 0,
            spans_total: 0,
            embeddings_total: 0,
            enrichments_total: 0,
            pending: 0,
            poisoned: 0,
            stale_files: 0,
            model_id: model_id.to_string(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Copies the aggregate counters in.
    pub fn apply_counters(&mut self, c: StoreCounters) {
        self.files_total = c.files_total;
        self.spans_total = c.spans_total;
        self.embeddings_total = c.embeddings_total;
        self.enrichments_total = c.enrichments_total;
        self.pending = c.pending;
        self.poisoned = c.poisoned;
    }

    /// Reads the status file. Absent file yields `None`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

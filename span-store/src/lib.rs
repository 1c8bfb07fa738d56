//! Durable, crash-safe span store for the LLMC RAG core.
//!
//! One store per repo, living at `<workspace>/rag/index_v2.db`. A single
//! writer (serialized by the repo write lock) and any number of readers.
//! All multi-row mutations are transactional; incomplete transactions are
//! discarded on open.

pub mod errors;
pub mod rows;
mod schema;
pub mod status;
mod store;

pub use errors::{Result, StoreError};
pub use rows::{
    AttemptRecord, EnrichmentBody, EnrichmentRecord, FailureRecord, FileRecord, RoutingDecision,
    SpanDiff, SpanRecord, StoreCounters, WorkItem,
};
pub use schema::SCHEMA_VERSION;
pub use status::IndexStatus;
pub use store::SpanStore;

use std::path::{Path, PathBuf};

/// Store location inside a repo workspace.
pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join("rag").join("index_v2.db")
}

/// Status-file location inside a repo workspace.
pub fn status_path(workspace: &Path) -> PathBuf {
    workspace.join("rag_index_status.json")
}

/// Symbol-graph sidecar location inside a repo workspace.
pub fn graph_path(workspace: &Path) -> PathBuf {
    workspace.join("rag_graph.json")
}

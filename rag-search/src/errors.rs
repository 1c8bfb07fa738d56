//! Error types for retrieval.

use thiserror::Error;

/// Convenient result alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The freshness gate refused to answer: too many files are pending
    /// re-index. Distinct from an empty result on purpose.
    #[error("index is stale: {pending} files pending re-index")]
    StaleIndex { pending: u64 },

    #[error("store error: {0}")]
    Store(#[from] span_store::StoreError),

    #[error("embedding backend error: {0}")]
    Backend(#[from] llm_gateway::BackendError),

    #[error("invalid embedding model id `{0}`: expected `<name>:<dim>`")]
    BadModelId(String),

    #[error("vector size mismatch: got={got}, want={want}")]
    VectorSizeMismatch { got: usize, want: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("graph sidecar parse error: {0}")]
    Graph(#[from] serde_json::Error),
}

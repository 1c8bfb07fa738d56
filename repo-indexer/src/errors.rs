//! Error types for the indexer orchestrator.

use thiserror::Error;

/// Convenient result alias for indexer operations.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Batch-level store failure; the batch aborts and the lock releases.
    #[error("store error: {0}")]
    Store(#[from] span_store::StoreError),

    #[error("path error: {0}")]
    Path(#[from] services::PathError),

    #[error("slicer error: {0}")]
    Slice(#[from] code_slicer::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] rag_search::SearchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The cancellation token fired at a safe point. Work already
    /// committed to the store survives.
    #[error("operation cancelled")]
    Cancelled,

    /// Slicing task was torn down mid-flight.
    #[error("background slicing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

//! Error types for the refresh daemon.

use thiserror::Error;

/// Convenient result alias for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry parse error: {0}")]
    Registry(#[from] serde_yml::Error),

    #[error("path error: {0}")]
    Path(#[from] services::PathError),

    #[error("lock error: {0}")]
    Lock(#[from] services::LockError),

    #[error("store error: {0}")]
    Store(#[from] span_store::StoreError),

    #[error("indexing error: {0}")]
    Index(#[from] repo_indexer::IndexError),

    #[error("search error: {0}")]
    Search(#[from] rag_search::SearchError),

    #[error("failure store error: {0}")]
    Failures(#[from] rusqlite::Error),

    #[error("repo not registered: {0}")]
    UnknownRepo(String),

    /// The repo's store failed integrity checks; it is marked unhealthy
    /// and excluded from writes until an operator intervenes.
    #[error("repo {0} is unhealthy (store corruption)")]
    Unhealthy(String),
}

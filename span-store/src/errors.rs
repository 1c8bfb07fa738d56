//! Error types for the span store.

use thiserror::Error;

/// Convenient result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Referential inconsistency: the span hash is not in the store.
    /// Callers schedule a consistency scan on this.
    #[error("unknown span: {0}")]
    UnknownSpan(String),

    /// Referential inconsistency: the file id is not in the store.
    #[error("unknown file: {0}")]
    UnknownFile(i64),

    /// The database failed its integrity check on open or during commit.
    /// The repo must be marked unhealthy; no further writes.
    #[error("store corruption: {0}")]
    Corruption(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Stored vector has a different dimension than requested.
    #[error("vector size mismatch: got={got}, want={want}")]
    VectorSizeMismatch { got: usize, want: usize },
}

impl StoreError {
    /// True for errors that indicate on-disk damage rather than misuse.
    pub fn is_corruption(&self) -> bool {
        match self {
            StoreError::Corruption(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}

//! Error types for the slicer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tree-sitter language error: {0}")]
    TreeSitterLanguage(String),

    #[error("file exceeds parse limit: {size} bytes")]
    FileTooLarge { size: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

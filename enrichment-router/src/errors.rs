//! Error types for the enrichment router.

use llm_gateway::{BackendError, ErrorKind};
use thiserror::Error;

/// Convenient result alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Debug, Error)]
pub enum RouterError {
    /// The slice family routes to a chain that has zero enabled backends.
    /// Raised before any adapter is called.
    #[error("chain `{0}` has no enabled backends")]
    ChainMisconfigured(String),

    /// No route matches the slice family and no default chain exists.
    #[error("no route for slice family `{0}` and no default chain")]
    NoRoute(String),

    /// Every backend of the chain was exhausted with retryable failures.
    #[error("chain `{chain}` exhausted: {last}")]
    ChainExhausted {
        chain: String,
        #[source]
        last: BackendError,
    },

    /// A backend failed non-retryably; the chain stops immediately.
    #[error("chain `{chain}` failed: {source}")]
    ChainFailed {
        chain: String,
        #[source]
        source: BackendError,
    },

    /// The cost tracker denied the call; enrichment pauses until the
    /// next budget window.
    #[error("budget exceeded on chain `{chain}`: {source}")]
    OverBudget {
        chain: String,
        #[source]
        source: BackendError,
    },
}

impl RouterError {
    /// Kind of the terminal backend error, when one exists.
    pub fn backend_kind(&self) -> Option<&ErrorKind> {
        match self {
            RouterError::ChainExhausted { last, .. } => Some(&last.kind),
            RouterError::ChainFailed { source, .. } => Some(&source.kind),
            RouterError::OverBudget { source, .. } => Some(&source.kind),
            _ => None,
        }
    }

    /// Chain the failure happened on, when one was resolved.
    pub fn chain(&self) -> Option<&str> {
        match self {
            RouterError::ChainExhausted { chain, .. }
            | RouterError::ChainFailed { chain, .. }
            | RouterError::OverBudget { chain, .. } => Some(chain),
            RouterError::ChainMisconfigured(chain) => Some(chain),
            RouterError::NoRoute(_) => None,
        }
    }

    /// Whether the orchestrator should bump the span's failure counter.
    /// Non-retryable chain failures count; exhaustion and budget pauses
    /// do not poison the span.
    pub fn counts_as_span_failure(&self) -> bool {
        matches!(self, RouterError::ChainFailed { .. })
    }

    /// Whether enrichment as a whole should pause (budget window).
    pub fn is_over_budget(&self) -> bool {
        matches!(self, RouterError::OverBudget { .. })
    }
}

//! Unified backend error type and retryability classification.
//!
//! Adapters report what happened (raw HTTP status or transport kind) and
//! never retry internally; the reliability layer and the router read
//! [`BackendError::retryable`] to decide between retry, cascade, and
//! terminal failure.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias for gateway operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// What went wrong, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The call exceeded its deadline.
    Timeout,
    /// Transient transport failure (connection reset, DNS, ...).
    Transient,
    /// Upstream HTTP status; retryability depends on the code.
    Http(u16),
    /// Credentials rejected. Fails the chain.
    AuthDenied,
    /// Provider quota exhausted. Fails the chain.
    QuotaExceeded,
    /// The configured model does not exist at the endpoint.
    ModelMissing,
    /// The response could not be parsed into the expected structure.
    MalformedResponse,
    /// Circuit breaker is open; adapter was not touched. Cascades.
    CircuitOpen,
    /// Cost cap would be exceeded. Terminal for the chain.
    BudgetExceeded,
    /// The backend configuration itself is unusable.
    InvalidConfig,
}

impl ErrorKind {
    /// Short stable code for logs and routing-decision records.
    pub fn code(&self) -> String {
        match self {
            ErrorKind::Timeout => "timeout".into(),
            ErrorKind::Transient => "transient".into(),
            ErrorKind::Http(s) => format!("http_{s}"),
            ErrorKind::AuthDenied => "auth_denied".into(),
            ErrorKind::QuotaExceeded => "quota_exceeded".into(),
            ErrorKind::ModelMissing => "model_missing".into(),
            ErrorKind::MalformedResponse => "malformed_response".into(),
            ErrorKind::CircuitOpen => "circuit_open".into(),
            ErrorKind::BudgetExceeded => "budget_exceeded".into(),
            ErrorKind::InvalidConfig => "invalid_config".into(),
        }
    }
}

/// Error from one backend call, carrying the backend identity for logs.
#[derive(Debug, Clone, Error)]
#[error("backend {backend_id}: {kind:?}: {message}")]
pub struct BackendError {
    pub backend_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(backend_id: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Retryable at the retrier level: timeouts, transient transport
    /// failures, and the retryable HTTP statuses (408/425/429/5xx).
    pub fn transient(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout | ErrorKind::Transient => true,
            ErrorKind::Http(s) => matches!(s, 408 | 425 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Retryable at the chain level: everything transient, plus an open
    /// circuit (try the next backend instead).
    pub fn retryable(&self) -> bool {
        self.transient() || self.kind == ErrorKind::CircuitOpen
    }

    /// Converts a reqwest failure, separating timeouts from other
    /// transport errors.
    pub fn from_transport(backend_id: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(backend_id, ErrorKind::Timeout, e.to_string())
        } else {
            Self::new(backend_id, ErrorKind::Transient, e.to_string())
        }
    }
}

/// Maps an upstream HTTP status to an error kind.
///
/// Auth and quota statuses are terminal; 404 at a model endpoint almost
/// always means the model name is wrong.
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::AuthDenied,
        402 => ErrorKind::QuotaExceeded,
        404 => ErrorKind::ModelMissing,
        s => ErrorKind::Http(s),
    }
}

/// Caps a response body for error messages.
pub fn make_snippet(body: &str) -> String {
    body.chars().take(240).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for s in [408u16, 425, 429, 500, 502, 503, 504] {
            let e = BackendError::new("b", ErrorKind::Http(s), "x");
            assert!(e.transient(), "{s} must be transient");
        }
        for s in [400u16, 409, 422] {
            let e = BackendError::new("b", ErrorKind::Http(s), "x");
            assert!(!e.transient(), "{s} must not be transient");
        }
    }

    #[test]
    fn circuit_open_cascades_but_does_not_retry() {
        let e = BackendError::new("b", ErrorKind::CircuitOpen, "open");
        assert!(!e.transient());
        assert!(e.retryable());
    }

    #[test]
    fn auth_statuses_are_terminal() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorKind::AuthDenied);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), ErrorKind::ModelMissing);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::Http(429)
        );
    }
}

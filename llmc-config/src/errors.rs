//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating the TOML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, or a key the schema does not recognize.
    #[error("config parse error: {0}")]
    Parse(String),

    /// A value failed validation.
    #[error("invalid config: {field}: {reason}")]
    Invalid {
        /// Dotted key path (e.g. `store.pending_weights`).
        field: &'static str,
        /// Human-readable constraint description.
        reason: String,
    },
}

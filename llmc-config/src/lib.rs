//! Configuration loader and validator for the LLMC RAG core.
//!
//! Responsibilities:
//! - Parse the TOML config file into [`LlmcConfig`]
//! - Apply defaults for every missing section or key
//! - Reject unknown keys at load time instead of silently ignoring them
//! - Validate constraints (caps must be positive, weights non-zero, ...)

pub mod errors;
pub mod model;

pub use errors::{ConfigError, Result};
pub use model::{
    BackendRole, ChainMember, DaemonSection, EnrichmentSection, LlmcConfig, ProviderLimits,
    RagSection, StoreSection,
};

use std::path::Path;

use tracing::{debug, info};

/// Reads and validates the config file at `path`.
///
/// # Errors
/// - [`ConfigError::Read`] when the file cannot be read.
/// - [`ConfigError::Parse`] on malformed TOML or unknown keys.
/// - [`ConfigError::Invalid`] when a value fails validation.
pub fn load(path: &Path) -> Result<LlmcConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let cfg: LlmcConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.validate()?;

    info!(
        path = %path.display(),
        chains = cfg.enrichment.chain.len(),
        routes = cfg.enrichment.routing.len(),
        "configuration loaded"
    );
    Ok(cfg)
}

/// Like [`load`], but falls back to defaults when the file is absent.
/// A present-but-broken file is still an error.
pub fn load_or_default(path: &Path) -> Result<LlmcConfig> {
    if path.exists() {
        load(path)
    } else {
        debug!(path = %path.display(), "config file absent, using defaults");
        let cfg = LlmcConfig::default();
        cfg.validate()?;
        Ok(cfg)
    }
}

//! Configuration data structures.
//!
//! Grouped by concern:
//! - [`RagSection`]: indexing and retrieval knobs
//! - [`EnrichmentSection`]: chains, providers, routing, cost caps
//! - [`DaemonSection`]: refresh cadence and parallelism
//! - [`StoreSection`]: failure thresholds and pending-work weighting
//!
//! Unknown keys are rejected (`deny_unknown_fields`) so typos surface at
//! load time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Result};

/// Top-level configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmcConfig {
    pub rag: RagSection,
    pub enrichment: EnrichmentSection,
    pub daemon: DaemonSection,
    pub store: StoreSection,
}

impl LlmcConfig {
    /// Validates cross-cutting constraints after deserialization.
    pub fn validate(&self) -> Result<()> {
        self.rag.validate()?;
        self.enrichment.validate()?;
        self.daemon.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

/// Indexing and retrieval options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RagSection {
    /// Embedding model identifier; the dimension rides after the colon
    /// (e.g. `nomic-embed-text:768`). Changing it invalidates stored
    /// embeddings.
    pub embedding_model: String,
    /// Provider family serving the embedding model.
    pub embedding_provider: String,
    /// Endpoint of the embedding backend.
    pub embedding_url: String,
    /// Freshness gate: queries are refused once more than this many files
    /// are pending re-index.
    pub max_stale_files: usize,
    /// Extra ignore globs on top of VCS-derived ignores.
    pub ignore_patterns: Vec<String>,
    /// Drop spans that fail the text-cleanliness check.
    pub enforce_clean_text: bool,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            embedding_model: String::from("nomic-embed-text:768"),
            embedding_provider: String::from("local"),
            embedding_url: String::from("http://127.0.0.1:11434"),
            max_stale_files: 25,
            ignore_patterns: Vec::new(),
            enforce_clean_text: true,
        }
    }
}

impl RagSection {
    fn validate(&self) -> Result<()> {
        let dim_ok = self
            .embedding_model
            .rsplit_once(':')
            .and_then(|(name, dim)| {
                (!name.is_empty()).then(|| dim.parse::<usize>().ok()).flatten()
            })
            .is_some_and(|d| d > 0);
        if !dim_ok {
            return Err(ConfigError::Invalid {
                field: "rag.embedding_model",
                reason: format!(
                    "expected `<name>:<dim>` with a positive dimension, got `{}`",
                    self.embedding_model
                ),
            });
        }
        Ok(())
    }
}

/// Backend role inside a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    Primary,
    Fallback,
}

/// One backend entry of a named chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainMember {
    /// Chain this member belongs to; entries sharing a name form a chain.
    pub name: String,
    /// Provider family key, must exist under `enrichment.providers`.
    pub provider: String,
    /// Model name as the provider expects it.
    pub model: String,
    /// Base URL of the endpoint.
    pub url: String,
    /// Tier label; lower tiers are attempted first.
    #[serde(default)]
    pub tier: u8,
    /// Primary or fallback role within the tier.
    #[serde(default = "default_role")]
    pub role: BackendRole,
    /// Per-call deadline.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Disabled members are skipped by the router.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_role() -> BackendRole {
    BackendRole::Primary
}

fn default_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl ChainMember {
    /// Stable identifier used in routing decisions and reliability state:
    /// `<provider>/<model>`.
    pub fn backend_id(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Per-provider reliability knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProviderLimits {
    /// Environment variable holding the API key; `None` for unauthenticated
    /// local endpoints.
    pub api_key_env: Option<String>,
    /// Requests per minute.
    pub rpm_limit: u32,
    /// Tokens per minute.
    pub tpm_limit: u32,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            api_key_env: None,
            rpm_limit: 60,
            tpm_limit: 120_000,
        }
    }
}

/// Enrichment pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EnrichmentSection {
    /// Daily spend ceiling across all backends, USD.
    pub daily_cost_cap_usd: f64,
    /// Monthly spend ceiling across all backends, USD.
    pub monthly_cost_cap_usd: f64,
    /// Flat list of chain members; grouped by `name` at runtime.
    pub chain: Vec<ChainMember>,
    /// Provider family → reliability limits.
    pub providers: BTreeMap<String, ProviderLimits>,
    /// Slice family (`code`, `docs`, `config`, `medical`, ...) → chain name.
    /// The entry named `default` catches everything unrouted.
    pub routing: BTreeMap<String, String>,
    /// Keep superseded enrichment rows for audit. Off by default: one
    /// current row per span.
    pub retain_history: bool,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            daily_cost_cap_usd: 1.0,
            monthly_cost_cap_usd: 15.0,
            chain: Vec::new(),
            providers: BTreeMap::new(),
            routing: BTreeMap::new(),
            retain_history: false,
        }
    }
}

impl EnrichmentSection {
    /// Groups chain members by chain name, ordered by (tier, declaration
    /// order) within each chain.
    pub fn chains(&self) -> BTreeMap<&str, Vec<&ChainMember>> {
        let mut out: BTreeMap<&str, Vec<&ChainMember>> = BTreeMap::new();
        for m in &self.chain {
            out.entry(m.name.as_str()).or_default().push(m);
        }
        for members in out.values_mut() {
            members.sort_by_key(|m| m.tier);
        }
        out
    }

    fn validate(&self) -> Result<()> {
        if self.daily_cost_cap_usd <= 0.0 || self.monthly_cost_cap_usd <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "enrichment.daily_cost_cap_usd",
                reason: "cost caps must be positive".into(),
            });
        }

        let chains = self.chains();
        for (family, chain_name) in &self.routing {
            if !chains.contains_key(chain_name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "enrichment.routing",
                    reason: format!("route `{family}` targets unknown chain `{chain_name}`"),
                });
            }
        }
        for member in &self.chain {
            if !self.providers.contains_key(&member.provider) {
                return Err(ConfigError::Invalid {
                    field: "enrichment.chain",
                    reason: format!(
                        "chain `{}` references provider `{}` with no `enrichment.providers` entry",
                        member.name, member.provider
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Refresh daemon knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DaemonSection {
    /// Seconds between scheduler ticks.
    pub interval_seconds: u64,
    /// Worker pool size across repos.
    pub max_parallel_repos: usize,
    /// Bounded wait for a contended repo lock before skipping the pass.
    pub lock_wait_seconds: u64,
    /// Grace period for the active repo on shutdown.
    pub shutdown_grace_seconds: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            max_parallel_repos: 2,
            lock_wait_seconds: 10,
            shutdown_grace_seconds: 20,
        }
    }
}

impl DaemonSection {
    fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "daemon.interval_seconds",
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_parallel_repos == 0 {
            return Err(ConfigError::Invalid {
                field: "daemon.max_parallel_repos",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

/// Span store knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreSection {
    /// Enrichment failures per span before it is poisoned.
    pub failure_threshold: u32,
    /// Weight bucket → draw weight for `pending_enrichments`. Buckets are
    /// slice families; higher weight means drawn more often. The default is
    /// code-first: `code = 1` against `docs = 7` means roughly seven code
    /// candidates per docs candidate.
    pub pending_weights: BTreeMap<String, u32>,
    /// Files touched more recently than this are left out of pending work,
    /// letting editors settle before enrichment spends money.
    pub cooldown_seconds: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(String::from("code"), 1);
        weights.insert(String::from("docs"), 7);
        Self {
            failure_threshold: 3,
            pending_weights: weights,
            cooldown_seconds: 30,
        }
    }
}

impl StoreSection {
    fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "store.failure_threshold",
                reason: "must be greater than 0".into(),
            });
        }
        if self.pending_weights.values().any(|w| *w == 0) {
            return Err(ConfigError::Invalid {
                field: "store.pending_weights",
                reason: "weights must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        LlmcConfig::default().validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let raw = "[rag]\nembedding_model = \"m:768\"\ntypo_key = 1\n";
        let err = toml::from_str::<LlmcConfig>(raw).unwrap_err();
        assert!(err.to_string().contains("typo_key"));
    }

    #[test]
    fn routing_to_unknown_chain_fails_validation() {
        let mut cfg = LlmcConfig::default();
        cfg.enrichment
            .routing
            .insert(String::from("code"), String::from("nope"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn chain_member_provider_must_be_declared() {
        let raw = r#"
            [[enrichment.chain]]
            name = "code"
            provider = "local"
            model = "qwen3:8b"
            url = "http://127.0.0.1:11434"
        "#;
        let cfg: LlmcConfig = toml::from_str(raw).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn full_chain_config_parses() {
        let raw = r#"
            [rag]
            embedding_model = "nomic-embed-text:768"
            max_stale_files = 10

            [enrichment]
            daily_cost_cap_usd = 0.5

            [[enrichment.chain]]
            name = "code"
            provider = "local"
            model = "qwen3:8b"
            url = "http://127.0.0.1:11434"
            tier = 0

            [[enrichment.chain]]
            name = "code"
            provider = "openai"
            model = "gpt-4o-mini"
            url = "https://api.openai.com"
            tier = 1
            role = "fallback"

            [enrichment.providers.local]
            rpm_limit = 120

            [enrichment.providers.openai]
            api_key_env = "OPENAI_API_KEY"
            rpm_limit = 30
            tpm_limit = 60000

            [enrichment.routing]
            code = "code"
            default = "code"

            [store]
            failure_threshold = 2
            pending_weights = { code = 1, docs = 7 }
        "#;
        let cfg: LlmcConfig = toml::from_str(raw).unwrap();
        cfg.validate().unwrap();

        let chains = cfg.enrichment.chains();
        let code = &chains["code"];
        assert_eq!(code.len(), 2);
        assert_eq!(code[0].tier, 0);
        assert_eq!(code[1].backend_id(), "openai/gpt-4o-mini");
    }

    #[test]
    fn embedding_model_requires_dimension_suffix() {
        let mut cfg = LlmcConfig::default();
        cfg.rag.embedding_model = String::from("nomic-embed-text");
        assert!(cfg.validate().is_err());
    }
}

//! Backend adapters, one per provider family.
//!
//! Adapters translate the uniform request into the provider's wire format
//! and normalize responses back. They never retry and never sleep; they
//! surface the raw HTTP status (or transport error kind) so the
//! reliability layer can classify correctly.

mod anthropic;
mod google;
mod local_http;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use google::GoogleGenAiAdapter;
pub use local_http::LocalHttpAdapter;
pub use openai::OpenAiCompatAdapter;

use std::time::Duration;

use reqwest::header;

use crate::errors::{BackendError, ErrorKind, Result};
use crate::request::{BackendConfig, EnrichmentRequest, EnrichmentResponse, ProviderKind};

/// Provider variant implementing the call capability. Dispatch is a plain
/// match; no inheritance, no dynamic registry.
pub enum BackendClient {
    LocalHttp(LocalHttpAdapter),
    OpenAiCompat(OpenAiCompatAdapter),
    Anthropic(AnthropicAdapter),
    GoogleGenAi(GoogleGenAiAdapter),
}

impl BackendClient {
    /// Builds the adapter matching the configured provider kind.
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        Ok(match cfg.kind {
            ProviderKind::LocalHttp => BackendClient::LocalHttp(LocalHttpAdapter::new(cfg)?),
            ProviderKind::OpenAiCompat => {
                BackendClient::OpenAiCompat(OpenAiCompatAdapter::new(cfg)?)
            }
            ProviderKind::Anthropic => BackendClient::Anthropic(AnthropicAdapter::new(cfg)?),
            ProviderKind::GoogleGenAi => {
                BackendClient::GoogleGenAi(GoogleGenAiAdapter::new(cfg)?)
            }
        })
    }

    /// One enrichment call. No retries here.
    pub async fn enrich(&self, req: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        match self {
            BackendClient::LocalHttp(a) => a.enrich(req).await,
            BackendClient::OpenAiCompat(a) => a.enrich(req).await,
            BackendClient::Anthropic(a) => a.enrich(req).await,
            BackendClient::GoogleGenAi(a) => a.enrich(req).await,
        }
    }

    /// One embedding call for a batch of texts. No retries here.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            BackendClient::LocalHttp(a) => a.embed(texts).await,
            BackendClient::OpenAiCompat(a) => a.embed(texts).await,
            BackendClient::Anthropic(a) => a.embed(texts).await,
            BackendClient::GoogleGenAi(a) => a.embed(texts).await,
        }
    }
}

/* ------------------------ shared construction ------------------------ */

/// Validates the endpoint scheme and returns the trimmed base URL.
pub(crate) fn check_endpoint(cfg: &BackendConfig) -> Result<String> {
    let endpoint = cfg.base_url.trim();
    if endpoint.is_empty()
        || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        return Err(BackendError::new(
            &cfg.id,
            ErrorKind::InvalidConfig,
            format!("invalid endpoint: {}", cfg.base_url),
        ));
    }
    Ok(endpoint.trim_end_matches('/').to_string())
}

/// The credential must be resolved for authenticated providers.
pub(crate) fn require_api_key(cfg: &BackendConfig) -> Result<String> {
    cfg.api_key.clone().ok_or_else(|| {
        BackendError::new(
            &cfg.id,
            ErrorKind::AuthDenied,
            "api key is not configured for this backend",
        )
    })
}

/// HTTP client with the per-call deadline and an optional auth header.
pub(crate) fn build_client(
    cfg: &BackendConfig,
    auth_header: Option<(&'static str, String)>,
) -> Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    if let Some((name, value)) = auth_header {
        let mut hv = header::HeaderValue::from_str(&value).map_err(|e| {
            BackendError::new(
                &cfg.id,
                ErrorKind::InvalidConfig,
                format!("credential is not header-safe: {e}"),
            )
        })?;
        hv.set_sensitive(true);
        headers.insert(name, hv);
    }

    reqwest::Client::builder()
        .timeout(if cfg.timeout.is_zero() {
            Duration::from_secs(60)
        } else {
            cfg.timeout
        })
        .default_headers(headers)
        .build()
        .map_err(|e| {
            BackendError::new(
                &cfg.id,
                ErrorKind::InvalidConfig,
                format!("http client build failed: {e}"),
            )
        })
}

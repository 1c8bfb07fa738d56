//! Adapter for the Google GenAI REST API.
//!
//! - `POST {base}/v1beta/models/{model}:generateContent` — completion
//!
//! The API key travels as the `x-goog-api-key` header. Embeddings are not
//! wired for this family; `embed` reports the misconfiguration.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{BackendError, ErrorKind, Result, classify_status, make_snippet};
use crate::request::{
    BackendConfig, EnrichmentRequest, EnrichmentResponse, enrichment_prompt,
    parse_enrichment_output,
};

use super::{build_client, check_endpoint, require_api_key};

pub struct GoogleGenAiAdapter {
    client: reqwest::Client,
    cfg: BackendConfig,
    url_generate: String,
}

impl GoogleGenAiAdapter {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        let base = check_endpoint(&cfg)?;
        let key = require_api_key(&cfg)?;
        let client = build_client(&cfg, Some(("x-goog-api-key", key)))?;
        Ok(Self {
            url_generate: format!("{base}/v1beta/models/{}:generateContent", cfg.model),
            client,
            cfg,
        })
    }

    #[instrument(skip_all, fields(backend = %self.cfg.id))]
    pub async fn enrich(&self, req: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: enrichment_prompt(req),
                }],
            }],
        };

        debug!("POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&self.cfg.id, &e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::new(
                &self.cfg.id,
                classify_status(status),
                format!("{} from {}: {}", status, self.url_generate, make_snippet(&text)),
            ));
        }

        let out: GenerateResponse = resp.json().await.map_err(|e| {
            BackendError::new(
                &self.cfg.id,
                ErrorKind::MalformedResponse,
                format!("decode error: {e}"),
            )
        })?;

        let text = out
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                BackendError::new(&self.cfg.id, ErrorKind::MalformedResponse, "no candidates")
            })?;

        let fields = parse_enrichment_output(&self.cfg.id, text)?;
        let usage = out.usage_metadata.unwrap_or_default();
        Ok(EnrichmentResponse {
            fields,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }

    pub async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(BackendError::new(
            &self.cfg.id,
            ErrorKind::InvalidConfig,
            "google backends are not wired for embeddings",
        ))
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ContentOut,
}

#[derive(Debug, Deserialize)]
struct ContentOut {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Debug, Deserialize)]
struct PartOut {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

//! Adapter for Ollama-style local HTTP model servers.
//!
//! - `POST {base}/api/generate`   — non-streaming text generation
//! - `POST {base}/api/embeddings` — embeddings retrieval

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{BackendError, Result, classify_status, make_snippet};
use crate::request::{
    BackendConfig, EnrichmentRequest, EnrichmentResponse, enrichment_prompt,
    parse_enrichment_output,
};

use super::{build_client, check_endpoint};

pub struct LocalHttpAdapter {
    client: reqwest::Client,
    cfg: BackendConfig,
    url_generate: String,
    url_embeddings: String,
}

impl LocalHttpAdapter {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        let base = check_endpoint(&cfg)?;
        let client = build_client(&cfg, None)?;
        Ok(Self {
            url_generate: format!("{base}/api/generate"),
            url_embeddings: format!("{base}/api/embeddings"),
            client,
            cfg,
        })
    }

    #[instrument(skip_all, fields(backend = %self.cfg.id))]
    pub async fn enrich(&self, req: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        let body = GenerateRequest {
            model: &self.cfg.model,
            prompt: enrichment_prompt(req),
            stream: false,
            format: Some("json"),
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
                crate::errors::ErrorKind::MalformedResponse,
                format!("decode error: {e}; ensure stream=false"),
            )
        })?;

        let fields = parse_enrichment_output(&self.cfg.id, &out.response)?;
        Ok(EnrichmentResponse {
            fields,
            input_tokens: out.prompt_eval_count.unwrap_or(0),
            output_tokens: out.eval_count.unwrap_or(0),
        })
    }

    #[instrument(skip_all, fields(backend = %self.cfg.id, batch = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = EmbeddingsRequest {
                model: &self.cfg.model,
                prompt: text,
            };
            let resp = self
                .client
                .post(&self.url_embeddings)
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
                    format!("{status}: {}", make_snippet(&text)),
                ));
            }

            let parsed: EmbeddingsResponse = resp.json().await.map_err(|e| {
                BackendError::new(
                    &self.cfg.id,
                    crate::errors::ErrorKind::MalformedResponse,
                    format!("decode error: {e}"),
                )
            })?;
            out.push(parsed.embedding);
        }
        Ok(out)
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

//! Adapter for OpenAI-compatible REST endpoints.
//!
//! - `POST {base}/v1/chat/completions` — non-streaming chat completion
//! - `POST {base}/v1/embeddings`       — batch embeddings

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{BackendError, ErrorKind, Result, classify_status, make_snippet};
use crate::request::{
    BackendConfig, EnrichmentRequest, EnrichmentResponse, enrichment_prompt,
    parse_enrichment_output,
};

use super::{build_client, check_endpoint, require_api_key};

pub struct OpenAiCompatAdapter {
    client: reqwest::Client,
    cfg: BackendConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OpenAiCompatAdapter {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        let base = check_endpoint(&cfg)?;
        let key = require_api_key(&cfg)?;
        let client = build_client(&cfg, Some(("authorization", format!("Bearer {key}"))))?;
        Ok(Self {
            url_chat: format!("{base}/v1/chat/completions"),
            url_embeddings: format!("{base}/v1/embeddings"),
            client,
            cfg,
        })
    }

    #[instrument(skip_all, fields(backend = %self.cfg.id))]
    pub async fn enrich(&self, req: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        let body = ChatRequest {
            model: &self.cfg.model,
            messages: vec![Message {
                role: "user",
                content: enrichment_prompt(req),
            }],
        };

        debug!("POST {}", self.url_chat);
        let resp = self
            .client
            .post(&self.url_chat)
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
                format!("{} from {}: {}", status, self.url_chat, make_snippet(&text)),
            ));
        }

        let out: ChatResponse = resp.json().await.map_err(|e| {
            BackendError::new(
                &self.cfg.id,
                ErrorKind::MalformedResponse,
                format!("decode error: {e}"),
            )
        })?;

        let content = out
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| {
                BackendError::new(&self.cfg.id, ErrorKind::MalformedResponse, "no choices")
            })?;

        let fields = parse_enrichment_output(&self.cfg.id, content)?;
        Ok(EnrichmentResponse {
            fields,
            input_tokens: out.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: out.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        })
    }

    #[instrument(skip_all, fields(backend = %self.cfg.id, batch = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            input: texts,
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
                ErrorKind::MalformedResponse,
                format!("decode error: {e}"),
            )
        })?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageOut,
}

#[derive(Debug, Deserialize)]
struct MessageOut {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

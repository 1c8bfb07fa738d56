//! Adapter for the Anthropic Messages API.
//!
//! - `POST {base}/v1/messages` — non-streaming message completion
//!
//! Anthropic serves no embeddings endpoint; `embed` reports the
//! misconfiguration instead of guessing.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{BackendError, ErrorKind, Result, classify_status, make_snippet};
use crate::request::{
    BackendConfig, EnrichmentRequest, EnrichmentResponse, enrichment_prompt,
    parse_enrichment_output,
};

use super::{build_client, check_endpoint, require_api_key};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;

pub struct AnthropicAdapter {
    client: reqwest::Client,
    cfg: BackendConfig,
    url_messages: String,
}

impl AnthropicAdapter {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        let base = check_endpoint(&cfg)?;
        let key = require_api_key(&cfg)?;
        let client = build_client(&cfg, Some(("x-api-key", key)))?;
        Ok(Self {
            url_messages: format!("{base}/v1/messages"),
            client,
            cfg,
        })
    }

    #[instrument(skip_all, fields(backend = %self.cfg.id))]
    pub async fn enrich(&self, req: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        let body = MessagesRequest {
            model: &self.cfg.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: vec![Message {
                role: "user",
                content: enrichment_prompt(req),
            }],
        };

        debug!("POST {}", self.url_messages);
        let resp = self
            .client
            .post(&self.url_messages)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
                format!("{} from {}: {}", status, self.url_messages, make_snippet(&text)),
            ));
        }

        let out: MessagesResponse = resp.json().await.map_err(|e| {
            BackendError::new(
                &self.cfg.id,
                ErrorKind::MalformedResponse,
                format!("decode error: {e}"),
            )
        })?;

        let text = out
            .content
            .iter()
            .find(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .ok_or_else(|| {
                BackendError::new(&self.cfg.id, ErrorKind::MalformedResponse, "no text block")
            })?;

        let fields = parse_enrichment_output(&self.cfg.id, text)?;
        Ok(EnrichmentResponse {
            fields,
            input_tokens: out.usage.input_tokens,
            output_tokens: out.usage.output_tokens,
        })
    }

    pub async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(BackendError::new(
            &self.cfg.id,
            ErrorKind::InvalidConfig,
            "anthropic backends do not serve embeddings",
        ))
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: UsageOut,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageOut {
    input_tokens: u64,
    output_tokens: u64,
}

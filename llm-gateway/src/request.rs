//! Uniform wire contract between the router and backend adapters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BackendError, ErrorKind, Result};

/// What the backend is asked to do with the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Produce the structured enrichment object.
    Enrich,
    /// Produce an embedding vector.
    Embed,
}

/// Provider family behind an adapter. Spec-wise this is the capability
/// variant: each member knows how to translate the uniform request into
/// its own wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama-style local HTTP model server.
    LocalHttp,
    /// OpenAI-compatible REST (`/v1/chat/completions`, `/v1/embeddings`).
    OpenAiCompat,
    /// Anthropic REST (`/v1/messages`).
    Anthropic,
    /// Google GenAI REST (`:generateContent`).
    GoogleGenAi,
}

impl ProviderKind {
    /// Parses the provider tag from configuration.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "local" | "ollama" | "local_http" => Ok(ProviderKind::LocalHttp),
            "openai" | "openai_compat" => Ok(ProviderKind::OpenAiCompat),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" | "gemini" | "google_genai" => Ok(ProviderKind::GoogleGenAi),
            other => Err(BackendError::new(
                other,
                ErrorKind::InvalidConfig,
                format!("unsupported provider tag: {other}"),
            )),
        }
    }
}

/// Everything the gateway needs to call one backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Stable identifier (`<provider>/<model>`), used in decisions and
    /// reliability state.
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    pub base_url: String,
    /// Resolved credential; never logged.
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Requests per minute for the token bucket.
    pub rpm_limit: u32,
    /// Tokens per minute for the token bucket.
    pub tpm_limit: u32,
}

/// Uniform enrichment request.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentRequest {
    pub span_text: String,
    pub path: String,
    pub slice_type: String,
    pub sub_language: String,
    pub task_kind: TaskKind,
}

impl EnrichmentRequest {
    /// Rough token estimate for rate limiting and cost checks, before the
    /// provider reports actuals.
    pub fn estimated_tokens(&self) -> u64 {
        // ~4 bytes per token holds well enough for code and prose.
        (self.span_text.len() as u64 / 4).max(16) + 512
    }
}

/// Structured enrichment fields a backend must return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFields {
    pub summary: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub pitfalls: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Uniform enrichment response with chargeable token counts.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResponse {
    pub fields: EnrichmentFields,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Extracts the first JSON object from a model completion and parses the
/// enrichment fields out of it. Models routinely wrap JSON in prose or
/// code fences; anything that still fails to parse is a malformed
/// response and therefore non-retryable for the producing backend.
pub fn parse_enrichment_output(backend_id: &str, raw: &str) -> Result<EnrichmentFields> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(BackendError::new(
            backend_id,
            ErrorKind::MalformedResponse,
            format!("no JSON object in output: {}", crate::errors::make_snippet(raw)),
        ));
    };
    if end < start {
        return Err(BackendError::new(
            backend_id,
            ErrorKind::MalformedResponse,
            "unbalanced JSON braces in output",
        ));
    }

    let fields: EnrichmentFields =
        serde_json::from_str(&raw[start..=end]).map_err(|e| {
            BackendError::new(
                backend_id,
                ErrorKind::MalformedResponse,
                format!("enrichment JSON did not validate: {e}"),
            )
        })?;

    if fields.summary.trim().is_empty() {
        return Err(BackendError::new(
            backend_id,
            ErrorKind::MalformedResponse,
            "enrichment summary is empty",
        ));
    }
    Ok(fields)
}

/// Prompt sent to completion-style backends for the enrich task.
pub fn enrichment_prompt(req: &EnrichmentRequest) -> String {
    format!(
        "You are annotating one source span for a retrieval index.\n\
         File: {path}\n\
         Span type: {slice_type} ({sub_language})\n\n\
         Return ONLY a JSON object with the keys:\n\
         summary (one sentence), inputs (array of strings), outputs (array of strings),\n\
         pitfalls (array of strings), tags (array of short lowercase strings).\n\n\
         Span:\n```\n{text}\n```",
        path = req.path,
        slice_type = req.slice_type,
        sub_language = req.sub_language,
        text = req.span_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"summary": "adds numbers", "inputs": ["x"], "outputs": ["sum"], "pitfalls": [], "tags": ["math"]}"#;
        let f = parse_enrichment_output("b", raw).unwrap();
        assert_eq!(f.summary, "adds numbers");
        assert_eq!(f.tags, vec!["math"]);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Sure! Here it is:\n```json\n{\"summary\": \"ok\"}\n```\nDone.";
        let f = parse_enrichment_output("b", raw).unwrap();
        assert_eq!(f.summary, "ok");
    }

    #[test]
    fn empty_summary_is_malformed() {
        let err = parse_enrichment_output("b", r#"{"summary": "  "}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let err = parse_enrichment_output("b", "I cannot do that.").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn provider_tags_parse() {
        assert_eq!(ProviderKind::parse("ollama").unwrap(), ProviderKind::LocalHttp);
        assert_eq!(ProviderKind::parse("OpenAI").unwrap(), ProviderKind::OpenAiCompat);
        assert!(ProviderKind::parse("mystery").is_err());
    }
}

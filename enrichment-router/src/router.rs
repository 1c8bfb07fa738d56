//! Chain selection and cascade.
//!
//! The cascade reads as a flat loop over backends: retryable exhaustion
//! (including an open circuit) moves on to the next backend, a
//! non-retryable failure stops the chain, the first success wins. Every
//! attempt is appended to the routing decision, which is emitted exactly
//! when at least one backend was engaged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use llm_gateway::{
    BackendError, EnrichmentFields, EnrichmentRequest, ErrorKind, TaskKind, estimate_cost,
    ProviderKind,
};
use llmc_config::{ChainMember, EnrichmentSection};
use span_store::{AttemptRecord, EnrichmentBody, RoutingDecision, WorkItem};
use tracing::{debug, info, warn};

use crate::errors::{Result, RouterError};
use crate::invoker::BackendInvoker;

/// Upper bound on tags accepted from a backend.
const MAX_TAGS: usize = 16;
/// Upper bound on list entries accepted per field.
const MAX_LIST_ITEMS: usize = 32;

/// A successful enrichment with its provenance.
#[derive(Debug, Clone)]
pub struct Enriched {
    pub body: EnrichmentBody,
    pub chain: String,
    pub tier: u8,
    pub provider: String,
    pub model: String,
}

/// Result of routing one work item: the outcome plus the audit record to
/// persist (absent when no backend was engaged, e.g. a misconfigured
/// chain).
#[derive(Debug)]
pub struct RouteOutcome {
    pub result: Result<Enriched>,
    pub decision: Option<RoutingDecision>,
}

/// Routes work items to chains and drives the cascade.
pub struct Router {
    /// Chain name → enabled members, tier-ordered.
    chains: BTreeMap<String, Vec<ChainMember>>,
    /// Slice family → chain name.
    routing: BTreeMap<String, String>,
    invoker: Arc<dyn BackendInvoker>,
}

impl Router {
    /// Builds the route table from validated configuration.
    pub fn from_config(section: &EnrichmentSection, invoker: Arc<dyn BackendInvoker>) -> Self {
        let mut chains: BTreeMap<String, Vec<ChainMember>> = BTreeMap::new();
        for (name, members) in section.chains() {
            chains.insert(
                name.to_string(),
                members.into_iter().cloned().collect::<Vec<_>>(),
            );
        }
        Self {
            chains,
            routing: section.routing.clone(),
            invoker,
        }
    }

    /// Resolves the chain for a slice family, falling back to `default`.
    ///
    /// # Errors
    /// - [`RouterError::NoRoute`] with neither a family nor default route.
    /// - [`RouterError::ChainMisconfigured`] when the chain exists but has
    ///   zero enabled backends; raised before any adapter call.
    pub fn chain_for(&self, family: &str) -> Result<(&str, Vec<&ChainMember>)> {
        let chain_name = self
            .routing
            .get(family)
            .or_else(|| self.routing.get("default"))
            .ok_or_else(|| RouterError::NoRoute(family.to_string()))?;

        let members: Vec<&ChainMember> = self
            .chains
            .get(chain_name)
            .map(|m| m.iter().filter(|b| b.enabled).collect())
            .unwrap_or_default();

        if members.is_empty() {
            return Err(RouterError::ChainMisconfigured(chain_name.clone()));
        }
        Ok((chain_name.as_str(), members))
    }

    /// Enriches one work item through its chain.
    pub async fn enrich(&self, item: &WorkItem) -> RouteOutcome {
        let (chain_name, members) = match self.chain_for(&item.family) {
            Ok(v) => v,
            Err(e) => {
                return RouteOutcome {
                    result: Err(e),
                    decision: None,
                };
            }
        };

        let req = EnrichmentRequest {
            span_text: item.text.clone(),
            path: item.path.clone(),
            slice_type: item.kind.clone(),
            sub_language: item.sub_language.clone(),
            task_kind: TaskKind::Enrich,
        };

        let started = Instant::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_err: Option<BackendError> = None;
        let mut winner: Option<Enriched> = None;

        for (index, member) in members.iter().enumerate() {
            let backend_id = member.backend_id();
            let attempt_started = Instant::now();
            debug!(
                chain = chain_name,
                backend = %backend_id,
                attempt = index,
                span = %item.span_hash,
                "attempting backend"
            );

            match self.invoker.invoke(member, &req).await {
                Ok(resp) => {
                    let latency = attempt_started.elapsed().as_millis() as u64;
                    match validate_fields(&backend_id, resp.fields) {
                        Ok(body) => {
                            attempts.push(AttemptRecord {
                                backend_id: backend_id.clone(),
                                attempt_index: index as u32,
                                outcome: String::from("success"),
                                latency_ms: latency,
                                input_tokens: resp.input_tokens,
                                output_tokens: resp.output_tokens,
                                estimated_cost_usd: attempt_cost(
                                    member,
                                    resp.input_tokens,
                                    resp.output_tokens,
                                ),
                            });
                            winner = Some(Enriched {
                                body,
                                chain: chain_name.to_string(),
                                tier: member.tier,
                                provider: member.provider.clone(),
                                model: member.model.clone(),
                            });
                            break;
                        }
                        Err(e) => {
                            // Structure did not validate: non-retryable
                            // for the producing backend, chain stops.
                            attempts.push(attempt_record(&e, index, latency));
                            warn!(
                                chain = chain_name,
                                backend = %backend_id,
                                "malformed enrichment output"
                            );
                            last_err = Some(e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    attempts.push(attempt_record(&e, index, attempt_started.elapsed().as_millis() as u64));
                    let cascade = e.retryable();
                    let budget = e.kind == ErrorKind::BudgetExceeded;
                    last_err = Some(e);
                    if budget || !cascade {
                        // Non-retryable and budget denials skip the
                        // remaining backends.
                        break;
                    }
                }
            }
        }

        let total_ms = started.elapsed().as_millis() as u64;
        let result = match (winner, last_err) {
            (Some(enriched), _) => Ok(enriched),
            (None, Some(e)) if e.kind == ErrorKind::BudgetExceeded => Err(RouterError::OverBudget {
                chain: chain_name.to_string(),
                source: e,
            }),
            (None, Some(e)) if e.retryable() => Err(RouterError::ChainExhausted {
                chain: chain_name.to_string(),
                last: e,
            }),
            (None, Some(e)) => Err(RouterError::ChainFailed {
                chain: chain_name.to_string(),
                source: e,
            }),
            (None, None) => Err(RouterError::ChainMisconfigured(chain_name.to_string())),
        };

        let decision = (!attempts.is_empty()).then(|| {
            let outcome = match &result {
                Ok(_) => String::from("success"),
                Err(RouterError::OverBudget { .. }) => String::from("budget_exceeded"),
                Err(RouterError::ChainExhausted { .. }) => String::from("backend_exhausted"),
                Err(RouterError::ChainFailed { source, .. }) => source.kind.code(),
                Err(_) => String::from("error"),
            };
            RoutingDecision {
                span_hash: item.span_hash.clone(),
                slice_kind: item.kind.clone(),
                chain: chain_name.to_string(),
                outcome,
                total_duration_ms: total_ms,
                input_tokens: attempts.iter().map(|a| a.input_tokens).sum(),
                output_tokens: attempts.iter().map(|a| a.output_tokens).sum(),
                estimated_cost_usd: attempts.iter().map(|a| a.estimated_cost_usd).sum(),
                attempts,
                decided_utc: Utc::now(),
            }
        });

        if let Ok(enriched) = &result {
            info!(
                chain = chain_name,
                provider = %enriched.provider,
                model = %enriched.model,
                span = %item.span_hash,
                latency_ms = total_ms,
                "enrichment routed"
            );
        }

        RouteOutcome { result, decision }
    }
}

fn attempt_record(e: &BackendError, index: usize, latency_ms: u64) -> AttemptRecord {
    AttemptRecord {
        backend_id: e.backend_id.clone(),
        attempt_index: index as u32,
        outcome: e.kind.code(),
        latency_ms,
        input_tokens: 0,
        output_tokens: 0,
        estimated_cost_usd: 0.0,
    }
}

fn attempt_cost(member: &ChainMember, input_tokens: u64, output_tokens: u64) -> f64 {
    match ProviderKind::parse(&member.provider) {
        Ok(kind) => estimate_cost(kind, input_tokens, output_tokens),
        Err(_) => 0.0,
    }
}

/// Structural validation of backend output before persisting.
///
/// # Errors
/// [`ErrorKind::MalformedResponse`], non-retryable for the producing
/// backend.
fn validate_fields(
    backend_id: &str,
    fields: EnrichmentFields,
) -> std::result::Result<EnrichmentBody, BackendError> {
    let summary = fields.summary.trim().to_string();
    if summary.is_empty() {
        return Err(BackendError::new(
            backend_id,
            ErrorKind::MalformedResponse,
            "empty summary",
        ));
    }
    if fields.tags.len() > MAX_TAGS
        || fields.inputs.len() > MAX_LIST_ITEMS
        || fields.outputs.len() > MAX_LIST_ITEMS
        || fields.pitfalls.len() > MAX_LIST_ITEMS
    {
        return Err(BackendError::new(
            backend_id,
            ErrorKind::MalformedResponse,
            "enrichment lists exceed bounds",
        ));
    }

    let clean = |v: Vec<String>| -> Vec<String> {
        v.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    Ok(EnrichmentBody {
        summary,
        inputs: clean(fields.inputs),
        outputs: clean(fields.outputs),
        pitfalls: clean(fields.pitfalls),
        tags: clean(fields.tags)
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::BackendInvoker;
    use llm_gateway::EnrichmentResponse;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Scripted invoker: pops the next outcome per backend id.
    struct Scripted {
        script: Mutex<BTreeMap<String, Vec<std::result::Result<EnrichmentResponse, BackendError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(
            script: Vec<(&str, std::result::Result<EnrichmentResponse, BackendError>)>,
        ) -> Self {
            let mut map: BTreeMap<String, Vec<_>> = BTreeMap::new();
            for (id, outcome) in script {
                map.entry(id.to_string()).or_default().push(outcome);
            }
            Self {
                script: Mutex::new(map),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BackendInvoker for Scripted {
        fn invoke<'a>(
            &'a self,
            member: &'a ChainMember,
            _req: &'a EnrichmentRequest,
        ) -> Pin<
            Box<
                dyn Future<Output = std::result::Result<EnrichmentResponse, BackendError>>
                    + Send
                    + 'a,
            >,
        > {
            let id = member.backend_id();
            self.calls.lock().unwrap().push(id.clone());
            let outcome = self
                .script
                .lock()
                .unwrap()
                .get_mut(&id)
                .and_then(|v| if v.is_empty() { None } else { Some(v.remove(0)) })
                .unwrap_or_else(|| {
                    Err(BackendError::new(&id, ErrorKind::Transient, "unscripted"))
                });
            Box::pin(async move { outcome })
        }
    }

    fn ok_response(summary: &str) -> EnrichmentResponse {
        EnrichmentResponse {
            fields: EnrichmentFields {
                summary: summary.to_string(),
                tags: vec![String::from("Code")],
                ..EnrichmentFields::default()
            },
            input_tokens: 100,
            output_tokens: 50,
        }
    }

    fn section(members: Vec<ChainMember>) -> EnrichmentSection {
        let raw = EnrichmentSection {
            chain: members,
            ..EnrichmentSection::default()
        };
        let mut s = raw;
        s.routing.insert(String::from("code"), String::from("code"));
        s.routing
            .insert(String::from("default"), String::from("code"));
        s
    }

    fn member(provider: &str, model: &str, tier: u8, enabled: bool) -> ChainMember {
        ChainMember {
            name: String::from("code"),
            provider: provider.to_string(),
            model: model.to_string(),
            url: String::from("http://127.0.0.1:1"),
            tier,
            role: llmc_config::BackendRole::Primary,
            timeout_seconds: 5,
            enabled,
        }
    }

    fn work_item() -> WorkItem {
        WorkItem {
            span_hash: String::from("abc123"),
            path: String::from("src/lib.rs"),
            kind: String::from("function"),
            family: String::from("code"),
            sub_language: String::from("rust"),
            text: String::from("fn x() {}"),
            identifiers: vec![String::from("x")],
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_later_backends_are_not_called() {
        let invoker = Arc::new(Scripted::new(vec![
            ("local/7b", Ok(ok_response("does things"))),
        ]));
        let router = Router::from_config(
            &section(vec![
                member("local", "7b", 0, true),
                member("openai", "small", 1, true),
            ]),
            invoker.clone(),
        );

        let out = router.enrich(&work_item()).await;
        let enriched = out.result.unwrap();
        assert_eq!(enriched.provider, "local");
        assert_eq!(enriched.body.tags, vec!["code"]);
        assert_eq!(invoker.calls(), vec!["local/7b"]);

        let d = out.decision.unwrap();
        assert_eq!(d.outcome, "success");
        assert_eq!(d.attempts.len(), 1);
        assert_eq!(d.input_tokens, 100);
    }

    #[tokio::test]
    async fn circuit_open_cascades_to_next_backend() {
        let invoker = Arc::new(Scripted::new(vec![
            (
                "local/7b",
                Err(BackendError::new("local/7b", ErrorKind::CircuitOpen, "open")),
            ),
            ("openai/small", Ok(ok_response("fallback"))),
        ]));
        let router = Router::from_config(
            &section(vec![
                member("local", "7b", 0, true),
                member("openai", "small", 1, true),
                member("openai", "mid", 2, true),
            ]),
            invoker.clone(),
        );

        let out = router.enrich(&work_item()).await;
        assert!(out.result.is_ok());
        // remote-mid is never engaged once remote-small succeeds.
        assert_eq!(invoker.calls(), vec!["local/7b", "openai/small"]);

        let d = out.decision.unwrap();
        assert_eq!(d.attempts.len(), 2);
        assert_eq!(d.attempts[0].outcome, "circuit_open");
        assert_eq!(d.attempts[1].outcome, "success");
    }

    #[tokio::test]
    async fn non_retryable_failure_stops_the_chain() {
        let invoker = Arc::new(Scripted::new(vec![(
            "openai/small",
            Err(BackendError::new(
                "openai/small",
                ErrorKind::AuthDenied,
                "bad key",
            )),
        )]));
        let router = Router::from_config(
            &section(vec![
                member("openai", "small", 0, true),
                member("openai", "mid", 1, true),
            ]),
            invoker.clone(),
        );

        let out = router.enrich(&work_item()).await;
        let err = out.result.unwrap_err();
        assert!(err.counts_as_span_failure());
        assert_eq!(invoker.calls(), vec!["openai/small"]);
        assert_eq!(out.decision.unwrap().outcome, "auth_denied");
    }

    #[tokio::test]
    async fn budget_denial_skips_remaining_backends() {
        let invoker = Arc::new(Scripted::new(vec![(
            "openai/small",
            Err(BackendError::new(
                "openai/small",
                ErrorKind::BudgetExceeded,
                "cap",
            )),
        )]));
        let router = Router::from_config(
            &section(vec![
                member("openai", "small", 0, true),
                member("openai", "mid", 1, true),
            ]),
            invoker.clone(),
        );

        let out = router.enrich(&work_item()).await;
        assert!(out.result.unwrap_err().is_over_budget());
        assert_eq!(invoker.calls(), vec!["openai/small"]);
        assert_eq!(out.decision.unwrap().outcome, "budget_exceeded");
    }

    #[tokio::test]
    async fn zero_enabled_backends_raises_before_any_call() {
        let invoker = Arc::new(Scripted::new(vec![]));
        let router = Router::from_config(
            &section(vec![member("local", "7b", 0, false)]),
            invoker.clone(),
        );

        let out = router.enrich(&work_item()).await;
        assert!(matches!(
            out.result,
            Err(RouterError::ChainMisconfigured(_))
        ));
        assert!(out.decision.is_none(), "no backend engaged, no decision");
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_chain_reports_backend_exhausted() {
        let timeout =
            |id: &str| Err(BackendError::new(id, ErrorKind::Timeout, "deadline"));
        let invoker = Arc::new(Scripted::new(vec![
            ("local/7b", timeout("local/7b")),
            ("openai/small", timeout("openai/small")),
        ]));
        let router = Router::from_config(
            &section(vec![
                member("local", "7b", 0, true),
                member("openai", "small", 1, true),
            ]),
            invoker.clone(),
        );

        let out = router.enrich(&work_item()).await;
        assert!(matches!(
            out.result,
            Err(RouterError::ChainExhausted { .. })
        ));
        let d = out.decision.unwrap();
        assert_eq!(d.outcome, "backend_exhausted");
        assert_eq!(d.attempts.len(), 2);
    }
}

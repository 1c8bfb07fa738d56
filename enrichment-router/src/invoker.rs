//! The backend-invocation seam.
//!
//! The router talks to backends only through [`BackendInvoker`], so tests
//! plug in scripted in-memory invokers and production plugs in the
//! gateway (with its full reliability stack): dependency injection at
//! the boundary instead of patching.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use llm_gateway::{
    BackendConfig, BackendError, EnrichmentRequest, EnrichmentResponse, ErrorKind, Gateway,
    ProviderKind, resolve_api_key,
};
use llmc_config::{ChainMember, ProviderLimits};

/// One reliability-wrapped call against one chain member.
pub trait BackendInvoker: Send + Sync {
    fn invoke<'a>(
        &'a self,
        member: &'a ChainMember,
        req: &'a EnrichmentRequest,
    ) -> Pin<
        Box<dyn Future<Output = std::result::Result<EnrichmentResponse, BackendError>> + Send + 'a>,
    >;
}

/// Production invoker: translates chain members into gateway backend
/// configs and calls through the reliability stack.
pub struct GatewayInvoker {
    gateway: Arc<Gateway>,
    providers: BTreeMap<String, ProviderLimits>,
}

impl GatewayInvoker {
    pub fn new(gateway: Arc<Gateway>, providers: BTreeMap<String, ProviderLimits>) -> Self {
        Self { gateway, providers }
    }

    /// Builds the gateway view of a chain member, resolving the provider
    /// kind, limits, and credential.
    pub fn backend_config(&self, member: &ChainMember) -> std::result::Result<BackendConfig, BackendError> {
        let kind = ProviderKind::parse(&member.provider)?;
        let limits = self.providers.get(&member.provider).cloned().ok_or_else(|| {
            BackendError::new(
                &member.backend_id(),
                ErrorKind::InvalidConfig,
                format!("provider `{}` has no limits entry", member.provider),
            )
        })?;
        let api_key = limits.api_key_env.as_deref().and_then(resolve_api_key);

        Ok(BackendConfig {
            id: member.backend_id(),
            kind,
            model: member.model.clone(),
            base_url: member.url.clone(),
            api_key,
            timeout: Duration::from_secs(member.timeout_seconds),
            rpm_limit: limits.rpm_limit,
            tpm_limit: limits.tpm_limit,
        })
    }
}

impl BackendInvoker for GatewayInvoker {
    fn invoke<'a>(
        &'a self,
        member: &'a ChainMember,
        req: &'a EnrichmentRequest,
    ) -> Pin<
        Box<dyn Future<Output = std::result::Result<EnrichmentResponse, BackendError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let cfg = self.backend_config(member)?;
            self.gateway.enrich(&cfg, req).await
        })
    }
}

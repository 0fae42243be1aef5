//! Provider strategies
//!
//! One implementation per vendor family behind a single capability
//! interface. Strategies translate normalized requests to the vendor wire,
//! decode responses and streams, extract usage from wherever the vendor
//! puts it, and map vendor failures into the closed error taxonomy.

pub mod anthropic;
pub mod bedrock;
pub mod ollama;
pub mod openai;
pub mod openai_compat;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::ProviderSettings;
use crate::error::{GatewayError, Result};
use crate::types::{Capability, ChatRequest, ChatResponse, ChunkStream, ProviderId};

pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;

/// Unified provider interface.
///
/// Concrete instances are passed explicitly; the retry driver and router
/// stay strategy-agnostic.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identity, used for routing, credentials, and accounting.
    fn id(&self) -> ProviderId;

    /// Non-streaming call.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Lazy, finite, non-restartable chunk sequence. Dropping the stream
    /// closes the underlying connection.
    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream>;

    /// Best-effort model discovery; falls back to the catalog projection
    /// when the vendor has no discovery endpoint.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Cheap local capability lookup.
    fn supports(&self, model: &str, capability: Capability) -> bool;
}

/// Builds and holds provider instances, one per family.
///
/// Construction is lazy: a missing credential surfaces as `AuthMissing`
/// only when a request actually targets that provider.
pub struct ProviderRegistry {
    catalog: Arc<Catalog>,
    settings: ProviderSettings,
    providers: DashMap<ProviderId, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(catalog: Arc<Catalog>, settings: ProviderSettings) -> Self {
        Self {
            catalog,
            settings,
            providers: DashMap::new(),
        }
    }

    /// Install a concrete instance, replacing any lazily built one. Tests
    /// use this to plug in mock providers.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id(), provider);
    }

    /// Fetch (building on first use) the strategy for a provider.
    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn Provider>> {
        if let Some(existing) = self.providers.get(&id) {
            return Ok(existing.clone());
        }
        let built = self.build(id)?;
        debug!(provider = %id, "provider strategy initialized");
        self.providers.insert(id, built.clone());
        Ok(built)
    }

    fn build(&self, id: ProviderId) -> Result<Arc<dyn Provider>> {
        let catalog = self.catalog.clone();
        let timeout = self.settings.timeout();
        let base_url = self.settings.base_url_override(id);

        let provider: Arc<dyn Provider> = match id {
            ProviderId::OpenAi => Arc::new(OpenAiProvider::from_env(
                catalog, base_url, timeout,
            )?),
            ProviderId::Anthropic => Arc::new(AnthropicProvider::from_env(
                catalog, base_url, timeout,
            )?),
            ProviderId::Google
            | ProviderId::DeepSeek
            | ProviderId::Groq
            | ProviderId::Xai
            | ProviderId::OpenRouter => Arc::new(OpenAiCompatProvider::from_env(
                id, catalog, base_url, timeout,
            )?),
            ProviderId::Ollama => Arc::new(OllamaProvider::from_env(catalog, base_url, timeout)?),
            ProviderId::Bedrock => Arc::new(BedrockProvider::from_env(catalog, timeout)?),
        };
        Ok(provider)
    }
}

/// Read a provider credential from the environment, or fail with the
/// taxonomy's `AuthMissing`.
pub(crate) fn require_env_key(provider: ProviderId) -> Result<String> {
    let var = provider.credential_env_var();
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GatewayError::AuthMissing {
            provider,
            env_var: var,
        }),
    }
}

/// Map a reqwest transport failure into the taxonomy.
pub(crate) fn map_transport_error(
    err: reqwest::Error,
    timeout: Duration,
) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::TransientNetwork(err.to_string())
    }
}

/// Map a non-success HTTP status into the taxonomy.
pub(crate) fn map_http_error(
    provider: ProviderId,
    model: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> GatewayError {
    let message = truncate_body(body);
    match status.as_u16() {
        401 | 403 => GatewayError::AuthRejected { provider, message },
        404 => GatewayError::ModelNotFound {
            model: model.to_string(),
        },
        429 => GatewayError::RateLimited {
            provider,
            retry_after,
        },
        400 | 422 => GatewayError::InvalidRequest(message),
        s if s >= 500 => GatewayError::UpstreamServerError {
            provider,
            status: s,
            message,
        },
        _ => GatewayError::ProviderProtocolError {
            provider,
            message: format!("unexpected status {status}: {message}"),
        },
    }
}

/// Parse a `Retry-After` header value (seconds form).
pub(crate) fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_mapping() {
        let e = map_http_error(ProviderId::OpenAi, "gpt-4o", StatusCode::UNAUTHORIZED, None, "bad key");
        assert!(matches!(e, GatewayError::AuthRejected { .. }));

        let e = map_http_error(
            ProviderId::Groq,
            "llama-3.1-8b-instant",
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            "slow down",
        );
        assert!(matches!(
            e,
            GatewayError::RateLimited {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(2)
        ));

        let e = map_http_error(ProviderId::OpenAi, "m", StatusCode::BAD_GATEWAY, None, "oops");
        assert!(matches!(e, GatewayError::UpstreamServerError { status: 502, .. }));

        let e = map_http_error(ProviderId::OpenAi, "m", StatusCode::NOT_FOUND, None, "gone");
        assert!(matches!(e, GatewayError::ModelNotFound { .. }));
    }

    #[test]
    fn test_missing_env_key() {
        std::env::remove_var("XAI_API_KEY");
        let err = require_env_key(ProviderId::Xai).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::AuthMissing {
                env_var: "XAI_API_KEY",
                ..
            }
        ));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let long = "é".repeat(600);
        let out = truncate_body(&long);
        assert!(out.ends_with('…'));
        assert!(out.len() < long.len());
    }
}

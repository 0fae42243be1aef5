//! OpenAI-compatible provider strategy
//!
//! One constructor-parameterized implementation covers every vendor that
//! speaks the OpenAI chat wire: Groq, DeepSeek, xAI, OpenRouter, and
//! Google's compatibility endpoint. Only `{base_url, credential, model-id
//! namespace}` differ; encode/decode is shared with the native OpenAI
//! strategy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::openai::{
    build_chat_payload, decode_chat_response, decode_chat_stream, extract_model_ids,
};
use super::{map_http_error, map_transport_error, parse_retry_after, require_env_key, Provider};
use crate::catalog::Catalog;
use crate::error::{GatewayError, Result};
use crate::types::{Capability, ChatRequest, ChatResponse, ChunkStream, ProviderId};

/// Default base URL per compatible vendor.
fn default_base_url(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Groq => "https://api.groq.com/openai/v1",
        ProviderId::DeepSeek => "https://api.deepseek.com/v1",
        ProviderId::Xai => "https://api.x.ai/v1",
        ProviderId::OpenRouter => "https://openrouter.ai/api/v1",
        ProviderId::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
        _ => unreachable!("not an OpenAI-compatible provider"),
    }
}

pub struct OpenAiCompatProvider {
    provider: ProviderId,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    catalog: Arc<Catalog>,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(
        provider: ProviderId,
        api_key: String,
        base_url: Option<String>,
        catalog: Arc<Catalog>,
        timeout: Duration,
    ) -> Result<Self> {
        debug_assert!(matches!(
            provider,
            ProviderId::Groq
                | ProviderId::DeepSeek
                | ProviderId::Xai
                | ProviderId::OpenRouter
                | ProviderId::Google
        ));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;
        Ok(Self {
            provider,
            api_key,
            base_url: base_url.unwrap_or_else(|| default_base_url(provider).to_string()),
            client,
            catalog,
            timeout,
        })
    }

    pub fn from_env(
        provider: ProviderId,
        catalog: Arc<Catalog>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = require_env_key(provider)?;
        Self::new(provider, api_key, base_url, catalog, timeout)
    }

    async fn send(&self, payload: &Value, model: &str) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(self.provider, model, status, retry_after, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> ProviderId {
        self.provider
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let entry = self.catalog.lookup_pair(self.provider, &request.model);
        let payload = build_chat_payload(request, entry.as_ref(), false);
        let response = self.send(&payload, &request.model).await?;
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: self.provider,
                message: format!("response body: {e}"),
            }
        })?;
        let mut decoded = decode_chat_response(self.provider, request, value)?;
        decoded.latency_ms = started.elapsed().as_millis() as u64;
        Ok(decoded)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let entry = self.catalog.lookup_pair(self.provider, &request.model);
        let payload = build_chat_payload(request, entry.as_ref(), true);
        let response = self.send(&payload, &request.model).await?;
        Ok(decode_chat_stream(self.provider, request.clone(), response))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            // Some compat vendors skip the discovery endpoint; project the
            // catalog instead of failing the caller.
            return Ok(self
                .catalog
                .list(Some(self.provider))
                .into_iter()
                .map(|e| e.model)
                .collect());
        }
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: self.provider,
                message: format!("model list: {e}"),
            }
        })?;
        Ok(extract_model_ids(&value))
    }

    fn supports(&self, model: &str, capability: Capability) -> bool {
        self.catalog.supports(self.provider, model, capability)
    }
}

//! OpenAI-native provider strategy
//!
//! Also home to the shared OpenAI wire encode/decode reused by every
//! OpenAI-compatible vendor. Cache hints are a no-op on this wire: OpenAI
//! caches long prefixes automatically and reports them in
//! `prompt_tokens_details.cached_tokens`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::sse::SseParser;
use super::{map_http_error, map_transport_error, parse_retry_after, require_env_key, Provider};
use crate::catalog::{Catalog, ModelEntry};
use crate::error::{GatewayError, Result};
use crate::types::{
    Capability, ChatRequest, ChatResponse, ChunkStream, ContentPart, FinishReason, ProviderId,
    StreamChunk, Usage,
};
use crate::utils::tokens;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    catalog: Arc<Catalog>,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        catalog: Arc<Catalog>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;
        Ok(Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
            catalog,
            timeout,
        })
    }

    pub fn from_env(
        catalog: Arc<Catalog>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = require_env_key(ProviderId::OpenAi)?;
        Self::new(api_key, base_url, catalog, timeout)
    }

    fn entry(&self, model: &str) -> Option<ModelEntry> {
        self.catalog.lookup_pair(ProviderId::OpenAi, model)
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
            return Err(map_http_error(
                ProviderId::OpenAi,
                model,
                status,
                retry_after,
                &body,
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let payload = build_chat_payload(request, self.entry(&request.model).as_ref(), false);
        let response = self.send(&payload, &request.model).await?;
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: ProviderId::OpenAi,
                message: format!("response body: {e}"),
            }
        })?;
        let mut decoded = decode_chat_response(ProviderId::OpenAi, request, value)?;
        decoded.latency_ms = started.elapsed().as_millis() as u64;
        Ok(decoded)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let payload = build_chat_payload(request, self.entry(&request.model).as_ref(), true);
        let response = self.send(&payload, &request.model).await?;
        Ok(decode_chat_stream(ProviderId::OpenAi, request.clone(), response))
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
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(ProviderId::OpenAi, "", status, None, &body));
        }
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: ProviderId::OpenAi,
                message: format!("model list: {e}"),
            }
        })?;
        Ok(extract_model_ids(&value))
    }

    fn supports(&self, model: &str, capability: Capability) -> bool {
        self.catalog.supports(ProviderId::OpenAi, model, capability)
    }
}

// ==================== Shared OpenAI wire ====================

/// Render normalized messages into OpenAI chat format. Text-only messages
/// stay plain strings; images become content-part arrays with data URLs.
pub(crate) fn render_messages(request: &ChatRequest) -> Value {
    let rendered: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let mut obj = json!({ "role": message.role.to_string() });
            if message.has_images() {
                let parts: Vec<Value> = message
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                        ContentPart::Image { mime, data } => json!({
                            "type": "image_url",
                            "image_url": { "url": format!("data:{mime};base64,{data}") }
                        }),
                    })
                    .collect();
                obj["content"] = Value::Array(parts);
            } else {
                obj["content"] = Value::String(message.text());
            }
            if let Some(name) = &message.name {
                obj["name"] = Value::String(name.clone());
            }
            obj
        })
        .collect();
    Value::Array(rendered)
}

/// Build the chat-completions payload.
///
/// Reasoning models (catalog `fixed_temperature`) take
/// `max_completion_tokens` and no temperature field; everything else uses
/// the classic parameters.
pub(crate) fn build_chat_payload(
    request: &ChatRequest,
    entry: Option<&ModelEntry>,
    stream: bool,
) -> Value {
    let mut payload = json!({
        "model": request.model,
        "messages": render_messages(request),
    });

    let pinned = entry.map(|e| e.fixed_temperature.is_some()).unwrap_or(false);
    if !pinned {
        payload["temperature"] = json!(request.temperature);
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
    }

    if let Some(max) = request.max_output_tokens {
        let field = if pinned { "max_completion_tokens" } else { "max_tokens" };
        payload[field] = json!(max);
    }
    if !request.stop.is_empty() {
        payload["stop"] = json!(request.stop);
    }
    if let Some(tools) = &request.tools {
        let rendered: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        payload["tools"] = Value::Array(rendered);
    }
    if stream {
        payload["stream"] = json!(true);
        payload["stream_options"] = json!({ "include_usage": true });
    }
    payload
}

pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Pull usage out of an OpenAI response or final stream chunk.
pub(crate) fn extract_usage(value: &Value) -> Option<Usage> {
    let usage = value.get("usage")?;
    if usage.is_null() {
        return None;
    }
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0) as u32;
    let cached = usage
        .get("prompt_tokens_details")
        .and_then(|d| d.get("cached_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let reasoning = usage
        .get("completion_tokens_details")
        .and_then(|d| d.get("reasoning_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    Some(Usage {
        prompt_tokens: field("prompt_tokens"),
        completion_tokens: field("completion_tokens"),
        cached_prompt_tokens: cached,
        cache_write_tokens: 0,
        cache_read_tokens: 0,
        reasoning_tokens: reasoning,
        estimated: false,
    })
}

/// Decode a non-streaming chat response.
pub(crate) fn decode_chat_response(
    provider: ProviderId,
    request: &ChatRequest,
    value: Value,
) -> Result<ChatResponse> {
    let choice = value
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| GatewayError::ProviderProtocolError {
            provider,
            message: "response carries no choices".to_string(),
        })?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(map_finish_reason)
        .unwrap_or(FinishReason::Stop);

    let usage = extract_usage(&value).unwrap_or_else(|| estimate_usage(request, &content));

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(&request.model)
        .to_string();

    Ok(ChatResponse {
        content,
        model,
        provider,
        usage,
        cost_usd: 0.0,
        latency_ms: 0,
        finish_reason,
        created_at: Utc::now(),
        cost_breakdown: None,
    })
}

/// Tokenizer-derived usage for wires that failed to report any.
pub(crate) fn estimate_usage(request: &ChatRequest, content: &str) -> Usage {
    Usage {
        prompt_tokens: tokens::estimate_request(request),
        completion_tokens: tokens::estimate_str(content),
        estimated: true,
        ..Default::default()
    }
}

/// Decode an OpenAI-wire SSE stream into normalized chunks.
///
/// The final chunk always carries usage: the vendor's own report when
/// `stream_options.include_usage` delivered one, a flagged estimate
/// otherwise.
pub(crate) fn decode_chat_stream(
    provider: ProviderId,
    request: ChatRequest,
    response: reqwest::Response,
) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();
        let mut pending_finish: Option<FinishReason> = None;
        let mut reported_usage: Option<Usage> = None;
        let mut produced = String::new();

        'body: while let Some(frame) = body.next().await {
            let bytes = match frame {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(GatewayError::TransientNetwork(format!(
                        "stream interrupted: {e}"
                    )));
                    return;
                }
            };
            for event in parser.feed(&bytes) {
                if event.is_done() {
                    break 'body;
                }
                let value: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(e) => {
                        yield Err(GatewayError::ProviderProtocolError {
                            provider,
                            message: format!("malformed stream frame: {e}"),
                        });
                        return;
                    }
                };
                if let Some(usage) = extract_usage(&value) {
                    reported_usage = Some(usage);
                }
                if let Some(choice) = value.get("choices").and_then(|c| c.get(0)) {
                    if let Some(delta) = choice
                        .get("delta")
                        .and_then(|d| d.get("content"))
                        .and_then(Value::as_str)
                    {
                        if !delta.is_empty() {
                            produced.push_str(delta);
                            yield Ok(StreamChunk::delta(delta));
                        }
                    }
                    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                        pending_finish = Some(map_finish_reason(reason));
                    }
                }
            }
        }

        let usage = match reported_usage {
            Some(usage) => usage,
            None => {
                debug!(provider = %provider, "vendor stream omitted usage, estimating");
                estimate_usage(&request, &produced)
            }
        };
        yield Ok(StreamChunk::finish(usage, pending_finish.unwrap_or(FinishReason::Stop)));
    };
    Box::pin(stream)
}

pub(crate) fn extract_model_ids(value: &Value) -> Vec<String> {
    value
        .get("data")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

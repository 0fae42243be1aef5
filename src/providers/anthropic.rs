//! Anthropic-native provider strategy
//!
//! The messages API differs from the OpenAI wire in three ways that matter
//! here: system prompts ride a top-level field, prompt caching is an
//! explicit `cache_control` directive per content block, and streams are
//! typed SSE events with usage split across `message_start` and
//! `message_delta`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};

use super::sse::SseParser;
use super::{map_http_error, map_transport_error, parse_retry_after, require_env_key, Provider};
use crate::catalog::{Catalog, ModelEntry};
use crate::error::{GatewayError, Result};
use crate::types::{
    Capability, ChatRequest, ChatResponse, ChunkStream, ContentPart, FinishReason, MessageRole,
    ProviderId, StreamChunk, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    catalog: Arc<Catalog>,
    timeout: Duration,
}

impl AnthropicProvider {
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
        let api_key = require_env_key(ProviderId::Anthropic)?;
        Self::new(api_key, base_url, catalog, timeout)
    }

    fn entry(&self, model: &str) -> Option<ModelEntry> {
        self.catalog.lookup_pair(ProviderId::Anthropic, model)
    }

    async fn send(&self, payload: &Value, model: &str) -> Result<reqwest::Response> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(
                ProviderId::Anthropic,
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
impl Provider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let payload = build_messages_payload(request, self.entry(&request.model).as_ref(), false);
        let response = self.send(&payload, &request.model).await?;
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: ProviderId::Anthropic,
                message: format!("response body: {e}"),
            }
        })?;
        let mut decoded = decode_messages_response(request, value)?;
        decoded.latency_ms = started.elapsed().as_millis() as u64;
        Ok(decoded)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let payload = build_messages_payload(request, self.entry(&request.model).as_ref(), true);
        let response = self.send(&payload, &request.model).await?;
        Ok(decode_messages_stream(response))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        // No discovery endpoint in use; project the catalog.
        Ok(self
            .catalog
            .list(Some(ProviderId::Anthropic))
            .into_iter()
            .map(|e| e.model)
            .collect())
    }

    fn supports(&self, model: &str, capability: Capability) -> bool {
        self.catalog.supports(ProviderId::Anthropic, model, capability)
    }
}

// ==================== Wire encoding ====================

fn render_blocks(message: &crate::types::Message) -> Vec<Value> {
    let mut blocks: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({ "type": "text", "text": text }),
            ContentPart::Image { mime, data } => json!({
                "type": "image",
                "source": { "type": "base64", "media_type": mime, "data": data }
            }),
        })
        .collect();

    // The cache directive attaches to the last block of the hinted segment.
    if message.cache_hint {
        if let Some(last) = blocks.last_mut() {
            last["cache_control"] = json!({ "type": "ephemeral" });
        }
    }
    blocks
}

/// Build the messages-API payload.
pub(crate) fn build_messages_payload(
    request: &ChatRequest,
    entry: Option<&ModelEntry>,
    stream: bool,
) -> Value {
    let mut system_blocks = Vec::new();
    let mut messages = Vec::new();

    for message in &request.messages {
        match message.role {
            MessageRole::System => system_blocks.extend(render_blocks(message)),
            MessageRole::User | MessageRole::Tool => messages.push(json!({
                "role": "user",
                "content": render_blocks(message),
            })),
            MessageRole::Assistant => messages.push(json!({
                "role": "assistant",
                "content": render_blocks(message),
            })),
        }
    }

    let max_tokens = request
        .max_output_tokens
        .or_else(|| entry.and_then(|e| e.output_ceiling))
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let temperature = entry
        .map(|e| e.effective_temperature(request.temperature))
        .unwrap_or(request.temperature)
        .min(1.0);

    let mut payload = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": temperature,
    });
    if !system_blocks.is_empty() {
        payload["system"] = Value::Array(system_blocks);
    }
    if let Some(top_p) = request.top_p {
        payload["top_p"] = json!(top_p);
    }
    if !request.stop.is_empty() {
        payload["stop_sequences"] = json!(request.stop);
    }
    if let Some(tools) = &request.tools {
        let rendered: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        payload["tools"] = Value::Array(rendered);
    }
    if stream {
        payload["stream"] = json!(true);
    }
    payload
}

// ==================== Wire decoding ====================

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Anthropic reports uncached input separately from cache traffic; fold the
/// read side back into `prompt_tokens` so the normalized invariant
/// `prompt = uncached + cache_read` holds.
fn extract_usage(value: &Value) -> Option<Usage> {
    let usage = value.get("usage")?;
    if usage.is_null() {
        return None;
    }
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0) as u32;
    let input = field("input_tokens");
    let cache_read = field("cache_read_input_tokens");
    Some(Usage {
        prompt_tokens: input + cache_read,
        completion_tokens: field("output_tokens"),
        cached_prompt_tokens: 0,
        cache_write_tokens: field("cache_creation_input_tokens"),
        cache_read_tokens: cache_read,
        reasoning_tokens: 0,
        estimated: false,
    })
}

pub(crate) fn decode_messages_response(request: &ChatRequest, value: Value) -> Result<ChatResponse> {
    let content = value
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .ok_or_else(|| GatewayError::ProviderProtocolError {
            provider: ProviderId::Anthropic,
            message: "response carries no content blocks".to_string(),
        })?;

    let finish_reason = value
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(map_stop_reason)
        .unwrap_or(FinishReason::Stop);

    let usage = extract_usage(&value).ok_or_else(|| GatewayError::ProviderProtocolError {
        provider: ProviderId::Anthropic,
        message: "response carries no usage".to_string(),
    })?;

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(&request.model)
        .to_string();

    Ok(ChatResponse {
        content,
        model,
        provider: ProviderId::Anthropic,
        usage,
        cost_usd: 0.0,
        latency_ms: 0,
        finish_reason,
        created_at: Utc::now(),
        cost_breakdown: None,
    })
}

fn map_stream_error(value: &Value) -> GatewayError {
    let error_type = value
        .get("error")
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let message = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown stream error")
        .to_string();

    match error_type {
        "rate_limit_error" => GatewayError::RateLimited {
            provider: ProviderId::Anthropic,
            retry_after: None,
        },
        "overloaded_error" => GatewayError::UpstreamServerError {
            provider: ProviderId::Anthropic,
            status: 529,
            message,
        },
        _ => GatewayError::ProviderProtocolError {
            provider: ProviderId::Anthropic,
            message,
        },
    }
}

/// Decode the event-typed SSE stream.
///
/// Usage accumulates across `message_start` (input side) and
/// `message_delta` (output side); the final chunk carries the merged total
/// and the mapped stop reason.
pub(crate) fn decode_messages_stream(response: reqwest::Response) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();
        let mut usage = Usage::default();
        let mut finish = FinishReason::Stop;
        let mut finalized = false;

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
                let value: Value = match serde_json::from_str(&event.data) {
                    Ok(v) => v,
                    Err(e) => {
                        yield Err(GatewayError::ProviderProtocolError {
                            provider: ProviderId::Anthropic,
                            message: format!("malformed stream frame: {e}"),
                        });
                        return;
                    }
                };
                let event_type = value.get("type").and_then(Value::as_str).unwrap_or("");
                match event_type {
                    "message_start" => {
                        if let Some(u) = value.get("message").and_then(extract_usage) {
                            usage.merge(&u);
                        }
                    }
                    "content_block_delta" => {
                        if let Some(text) = value
                            .get("delta")
                            .and_then(|d| d.get("text"))
                            .and_then(Value::as_str)
                        {
                            if !text.is_empty() {
                                yield Ok(StreamChunk::delta(text));
                            }
                        }
                    }
                    "message_delta" => {
                        if let Some(u) = extract_usage(&value) {
                            usage.merge(&u);
                        }
                        if let Some(reason) = value
                            .get("delta")
                            .and_then(|d| d.get("stop_reason"))
                            .and_then(Value::as_str)
                        {
                            finish = map_stop_reason(reason);
                        }
                    }
                    "message_stop" => {
                        finalized = true;
                        yield Ok(StreamChunk::finish(usage, finish));
                        break 'body;
                    }
                    "error" => {
                        yield Err(map_stream_error(&value));
                        return;
                    }
                    // ping, content_block_start, content_block_stop
                    _ => {}
                }
            }
        }

        if !finalized {
            yield Ok(StreamChunk::finish(usage, finish));
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn request() -> ChatRequest {
        ChatRequest::new(
            "claude-3-5-sonnet-20241022",
            vec![
                Message::system("You are terse.").with_cache_hint(),
                Message::user("What is 2+2?"),
            ],
        )
        .with_temperature(0.7)
    }

    #[test]
    fn test_payload_splits_system_and_messages() {
        let payload = build_messages_payload(&request(), None, false);
        let system = payload["system"].as_array().unwrap();
        assert_eq!(system[0]["text"], "You are terse.");
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(payload["max_tokens"], 4096);
    }

    #[test]
    fn test_cache_hint_becomes_cache_control() {
        let payload = build_messages_payload(&request(), None, false);
        let system = payload["system"].as_array().unwrap();
        assert_eq!(system[0]["cache_control"]["type"], "ephemeral");
        // Unhinted messages carry no directive.
        let messages = payload["messages"].as_array().unwrap();
        assert!(messages[0]["content"][0].get("cache_control").is_none());
    }

    #[test]
    fn test_temperature_clamped_to_anthropic_band() {
        let mut req = request();
        req.temperature = 1.8;
        let payload = build_messages_payload(&req, None, false);
        assert_eq!(payload["temperature"], 1.0);
    }

    #[test]
    fn test_images_render_as_base64_source() {
        let req = ChatRequest::new(
            "claude-3-5-sonnet-20241022",
            vec![Message::user("look").with_image("image/png", "aGVsbG8=")],
        );
        let payload = build_messages_payload(&req, None, false);
        let block = &payload["messages"][0]["content"][1];
        assert_eq!(block["type"], "image");
        assert_eq!(block["source"]["media_type"], "image/png");
        assert_eq!(block["source"]["data"], "aGVsbG8=");
    }

    #[test]
    fn test_decode_response_folds_cache_usage() {
        let value = json!({
            "model": "claude-3-5-sonnet-20241022",
            "content": [{ "type": "text", "text": "4" }],
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 10,
                "output_tokens": 1,
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": 50
            }
        });
        let resp = decode_messages_response(&request(), value).unwrap();
        assert_eq!(resp.content, "4");
        assert_eq!(resp.usage.prompt_tokens, 60);
        assert_eq!(resp.usage.cache_read_tokens, 50);
        assert_eq!(resp.usage.uncached_prompt_tokens(), 10);
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn test_decode_response_without_usage_is_protocol_error() {
        let value = json!({ "content": [{ "type": "text", "text": "4" }] });
        let err = decode_messages_response(&request(), value).unwrap_err();
        assert!(matches!(err, GatewayError::ProviderProtocolError { .. }));
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(map_stop_reason("end_turn"), FinishReason::Stop);
        assert_eq!(map_stop_reason("stop_sequence"), FinishReason::Stop);
        assert_eq!(map_stop_reason("max_tokens"), FinishReason::Length);
        assert_eq!(map_stop_reason("tool_use"), FinishReason::ToolCalls);
    }

    #[test]
    fn test_stream_error_mapping() {
        let overloaded = json!({
            "type": "error",
            "error": { "type": "overloaded_error", "message": "Overloaded" }
        });
        assert!(matches!(
            map_stream_error(&overloaded),
            GatewayError::UpstreamServerError { status: 529, .. }
        ));

        let rate = json!({
            "type": "error",
            "error": { "type": "rate_limit_error", "message": "slow down" }
        });
        assert!(matches!(map_stream_error(&rate), GatewayError::RateLimited { .. }));
    }
}

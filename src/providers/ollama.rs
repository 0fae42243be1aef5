//! Local-daemon provider strategy (Ollama)
//!
//! The daemon speaks newline-delimited JSON rather than SSE and bills
//! nothing, but context windows are still real. When the daemon omits
//! `prompt_eval_count`/`eval_count`, usage falls back to the tokenizer
//! heuristic and is flagged estimated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};

use super::openai::estimate_usage;
use super::{map_http_error, map_transport_error, Provider};
use crate::catalog::Catalog;
use crate::error::{GatewayError, Result};
use crate::types::{
    Capability, ChatRequest, ChatResponse, ChunkStream, ContentPart, FinishReason, ProviderId,
    StreamChunk, Usage,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    catalog: Arc<Catalog>,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(
        base_url: Option<String>,
        catalog: Arc<Catalog>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
            catalog,
            timeout,
        })
    }

    /// The daemon needs no credential; `OLLAMA_BASE_URL` overrides the
    /// default local address.
    pub fn from_env(
        catalog: Arc<Catalog>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.or_else(|| {
            std::env::var(ProviderId::Ollama.credential_env_var())
                .ok()
                .filter(|v| !v.trim().is_empty())
        });
        Self::new(base_url, catalog, timeout)
    }

    async fn send(&self, payload: &Value, model: &str) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(ProviderId::Ollama, model, status, None, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let payload = build_chat_payload(request, false);
        let response = self.send(&payload, &request.model).await?;
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: ProviderId::Ollama,
                message: format!("response body: {e}"),
            }
        })?;
        let mut decoded = decode_chat_response(request, value)?;
        decoded.latency_ms = started.elapsed().as_millis() as u64;
        Ok(decoded)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let payload = build_chat_payload(request, true);
        let response = self.send(&payload, &request.model).await?;
        Ok(decode_chat_stream(request.clone(), response))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: ProviderId::Ollama,
                message: format!("tag list: {e}"),
            }
        })?;
        Ok(value
            .get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn supports(&self, model: &str, capability: Capability) -> bool {
        self.catalog.supports(ProviderId::Ollama, model, capability)
    }
}

// ==================== Wire encoding / decoding ====================

fn build_chat_payload(request: &ChatRequest, stream: bool) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let mut text = String::new();
            let mut images = Vec::new();
            for part in &message.content {
                match part {
                    ContentPart::Text { text: t } => text.push_str(t),
                    ContentPart::Image { data, .. } => images.push(data.clone()),
                }
            }
            let mut obj = json!({ "role": message.role.to_string(), "content": text });
            if !images.is_empty() {
                obj["images"] = json!(images);
            }
            obj
        })
        .collect();

    let mut options = json!({ "temperature": request.temperature });
    if let Some(max) = request.max_output_tokens {
        options["num_predict"] = json!(max);
    }
    if let Some(top_p) = request.top_p {
        options["top_p"] = json!(top_p);
    }
    if !request.stop.is_empty() {
        options["stop"] = json!(request.stop);
    }

    json!({
        "model": request.model,
        "messages": messages,
        "stream": stream,
        "options": options,
    })
}

fn map_done_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Usage from eval counts; `None` when the daemon reported neither.
fn extract_usage(value: &Value) -> Option<Usage> {
    let prompt = value.get("prompt_eval_count").and_then(Value::as_u64);
    let completion = value.get("eval_count").and_then(Value::as_u64);
    if prompt.is_none() && completion.is_none() {
        return None;
    }
    Some(Usage::new(
        prompt.unwrap_or(0) as u32,
        completion.unwrap_or(0) as u32,
    ))
}

fn decode_chat_response(request: &ChatRequest, value: Value) -> Result<ChatResponse> {
    let content = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::ProviderProtocolError {
            provider: ProviderId::Ollama,
            message: "response carries no message content".to_string(),
        })?
        .to_string();

    let finish_reason = value
        .get("done_reason")
        .and_then(Value::as_str)
        .map(map_done_reason)
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
        provider: ProviderId::Ollama,
        usage,
        cost_usd: 0.0,
        latency_ms: 0,
        finish_reason,
        created_at: Utc::now(),
        cost_breakdown: None,
    })
}

/// Decode the NDJSON stream: one JSON object per line, `done: true` on the
/// last.
fn decode_chat_stream(request: ChatRequest, response: reqwest::Response) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut produced = String::new();
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
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                let value: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        yield Err(GatewayError::ProviderProtocolError {
                            provider: ProviderId::Ollama,
                            message: format!("malformed stream line: {e}"),
                        });
                        return;
                    }
                };

                if let Some(text) = value
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_str)
                {
                    if !text.is_empty() {
                        produced.push_str(text);
                        yield Ok(StreamChunk::delta(text));
                    }
                }

                if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
                    let usage = extract_usage(&value)
                        .unwrap_or_else(|| estimate_usage(&request, &produced));
                    let finish = value
                        .get("done_reason")
                        .and_then(Value::as_str)
                        .map(map_done_reason)
                        .unwrap_or(FinishReason::Stop);
                    finalized = true;
                    yield Ok(StreamChunk::finish(usage, finish));
                    break 'body;
                }
            }
        }

        if !finalized {
            yield Ok(StreamChunk::finish(
                estimate_usage(&request, &produced),
                FinishReason::Stop,
            ));
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn request() -> ChatRequest {
        ChatRequest::new("llama3.2", vec![Message::user("hi")])
    }

    #[test]
    fn test_payload_shape() {
        let payload = build_chat_payload(&request().with_max_output_tokens(128), true);
        assert_eq!(payload["model"], "llama3.2");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["options"]["num_predict"], 128);
        assert_eq!(payload["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_images_split_out_of_content() {
        let req = ChatRequest::new(
            "llama3.2",
            vec![Message::user("look").with_image("image/png", "aGVsbG8=")],
        );
        let payload = build_chat_payload(&req, false);
        assert_eq!(payload["messages"][0]["content"], "look");
        assert_eq!(payload["messages"][0]["images"][0], "aGVsbG8=");
    }

    #[test]
    fn test_decode_with_eval_counts() {
        let value = json!({
            "model": "llama3.2",
            "message": { "role": "assistant", "content": "hello" },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 9,
            "eval_count": 3
        });
        let resp = decode_chat_response(&request(), value).unwrap();
        assert_eq!(resp.usage.prompt_tokens, 9);
        assert_eq!(resp.usage.completion_tokens, 3);
        assert!(!resp.usage.estimated);
    }

    #[test]
    fn test_decode_without_counts_estimates() {
        let value = json!({
            "message": { "role": "assistant", "content": "hello there" },
            "done": true
        });
        let resp = decode_chat_response(&request(), value).unwrap();
        assert!(resp.usage.estimated);
        assert!(resp.usage.completion_tokens > 0);
    }

    #[test]
    fn test_done_reason_mapping() {
        assert_eq!(map_done_reason("stop"), FinishReason::Stop);
        assert_eq!(map_done_reason("length"), FinishReason::Length);
    }
}

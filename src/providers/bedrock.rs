//! AWS Bedrock provider strategy
//!
//! Talks to the Bedrock runtime converse API over plain reqwest with
//! hand-rolled SigV4 signing. Credentials follow the standard AWS
//! environment chain (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
//! optional `AWS_SESSION_TOKEN`, `AWS_REGION`).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{map_http_error, map_transport_error, parse_retry_after, Provider};
use crate::catalog::Catalog;
use crate::error::{GatewayError, Result};
use crate::types::{
    Capability, ChatRequest, ChatResponse, ChunkStream, ContentPart, FinishReason, MessageRole,
    ProviderId, StreamChunk, Usage,
};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "bedrock";
const DEFAULT_REGION: &str = "us-east-1";

/// SigV4 signer scoped to the Bedrock runtime service.
pub(crate) struct SigV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
}

impl SigV4Signer {
    fn new(
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
    ) -> Self {
        Self {
            access_key,
            secret_key,
            session_token,
            region,
        }
    }

    /// Produce the signed header set for a POST of `body` to `url`.
    fn sign(&self, url: &url::Url, body: &str) -> Result<BTreeMap<String, String>> {
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::Config("bedrock endpoint lacks a host".to_string()))?;
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        // BTreeMap keeps headers sorted, which SigV4 requires.
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &self.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{}\n", v.trim()))
            .collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
        let canonical_request = format!(
            "POST\n{}\n{}\n{}\n{}\n{}",
            url.path(),
            url.query().unwrap_or(""),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac(format!("AWS4{}", self.secret_key).as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

        headers.insert(
            "authorization".to_string(),
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.access_key
            ),
        );
        Ok(headers)
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::Config(format!("hmac key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub struct BedrockProvider {
    signer: SigV4Signer,
    region: String,
    client: reqwest::Client,
    catalog: Arc<Catalog>,
    timeout: Duration,
}

impl BedrockProvider {
    pub fn new(
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
        catalog: Arc<Catalog>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;
        Ok(Self {
            signer: SigV4Signer::new(access_key, secret_key, session_token, region.clone()),
            region,
            client,
            catalog,
            timeout,
        })
    }

    pub fn from_env(catalog: Arc<Catalog>, timeout: Duration) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::AuthMissing {
                provider: ProviderId::Bedrock,
                env_var: "AWS_ACCESS_KEY_ID",
            })?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::AuthMissing {
                provider: ProviderId::Bedrock,
                env_var: "AWS_SECRET_ACCESS_KEY",
            })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok().filter(|v| !v.is_empty());
        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());
        Self::new(access_key, secret_key, session_token, region, catalog, timeout)
    }

    fn endpoint(&self, model: &str, action: &str) -> Result<url::Url> {
        // The model id's namespace separator must be URI-encoded for the
        // canonical path to match what the service verifies.
        let encoded = model.replace(':', "%3A");
        let raw = format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{encoded}/{action}",
            self.region
        );
        url::Url::parse(&raw).map_err(|e| GatewayError::Config(format!("bedrock url: {e}")))
    }

    async fn send(&self, model: &str, action: &str, payload: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint(model, action)?;
        let body = payload.to_string();
        let headers = self.signer.sign(&url, &body)?;

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(
                ProviderId::Bedrock,
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
impl Provider for BedrockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Bedrock
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let payload = build_converse_payload(request);
        let response = self.send(&request.model, "converse", &payload).await?;
        let value: Value = response.json().await.map_err(|e| {
            GatewayError::ProviderProtocolError {
                provider: ProviderId::Bedrock,
                message: format!("response body: {e}"),
            }
        })?;
        let mut decoded = decode_converse_response(request, value)?;
        decoded.latency_ms = started.elapsed().as_millis() as u64;
        Ok(decoded)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let payload = build_converse_payload(request);
        let response = self.send(&request.model, "converse-stream", &payload).await?;
        Ok(decode_converse_stream(response))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        // Model discovery lives on the control-plane endpoint with separate
        // signing scope; project the catalog instead.
        Ok(self
            .catalog
            .list(Some(ProviderId::Bedrock))
            .into_iter()
            .map(|e| e.model)
            .collect())
    }

    fn supports(&self, model: &str, capability: Capability) -> bool {
        self.catalog.supports(ProviderId::Bedrock, model, capability)
    }
}

// ==================== Wire encoding / decoding ====================

fn render_content(message: &crate::types::Message) -> Vec<Value> {
    message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({ "text": text }),
            ContentPart::Image { mime, data } => json!({
                "image": {
                    "format": mime.strip_prefix("image/").unwrap_or("png"),
                    "source": { "bytes": data }
                }
            }),
        })
        .collect()
}

fn build_converse_payload(request: &ChatRequest) -> Value {
    let mut system = Vec::new();
    let mut messages = Vec::new();

    for message in &request.messages {
        match message.role {
            MessageRole::System => system.push(json!({ "text": message.text() })),
            MessageRole::User | MessageRole::Tool => messages.push(json!({
                "role": "user",
                "content": render_content(message),
            })),
            MessageRole::Assistant => messages.push(json!({
                "role": "assistant",
                "content": render_content(message),
            })),
        }
    }

    let mut inference = json!({ "temperature": request.temperature.min(1.0) });
    if let Some(max) = request.max_output_tokens {
        inference["maxTokens"] = json!(max);
    }
    if let Some(top_p) = request.top_p {
        inference["topP"] = json!(top_p);
    }
    if !request.stop.is_empty() {
        inference["stopSequences"] = json!(request.stop);
    }

    let mut payload = json!({
        "messages": messages,
        "inferenceConfig": inference,
    });
    if !system.is_empty() {
        payload["system"] = Value::Array(system);
    }
    payload
}

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "content_filtered" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn extract_usage(value: &Value) -> Option<Usage> {
    let usage = value.get("usage")?;
    Some(Usage::new(
        usage.get("inputTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        usage.get("outputTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
    ))
}

fn decode_converse_response(request: &ChatRequest, value: Value) -> Result<ChatResponse> {
    let content = value
        .get("output")
        .and_then(|o| o.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .ok_or_else(|| GatewayError::ProviderProtocolError {
            provider: ProviderId::Bedrock,
            message: "response carries no output message".to_string(),
        })?;

    let finish_reason = value
        .get("stopReason")
        .and_then(Value::as_str)
        .map(map_stop_reason)
        .unwrap_or(FinishReason::Stop);

    let usage = extract_usage(&value).ok_or_else(|| GatewayError::ProviderProtocolError {
        provider: ProviderId::Bedrock,
        message: "response carries no usage".to_string(),
    })?;

    Ok(ChatResponse {
        content,
        model: request.model.clone(),
        provider: ProviderId::Bedrock,
        usage,
        cost_usd: 0.0,
        latency_ms: 0,
        finish_reason,
        created_at: Utc::now(),
        cost_breakdown: None,
    })
}

/// Split AWS event-stream frames out of a byte buffer.
///
/// Frame layout: 4-byte total length, 4-byte header length, 4-byte prelude
/// CRC, headers, JSON payload, 4-byte message CRC. CRCs are not verified;
/// a frame whose payload fails to parse still surfaces a typed error.
fn drain_frames(buffer: &mut BytesMut) -> std::result::Result<Vec<Value>, String> {
    let mut payloads = Vec::new();
    loop {
        if buffer.len() < 12 {
            return Ok(payloads);
        }
        let total_len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if total_len < 16 {
            return Err(format!("frame length {total_len} below minimum"));
        }
        if buffer.len() < total_len {
            return Ok(payloads);
        }
        let headers_len =
            u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;
        let payload_start = 12 + headers_len;
        let payload_end = total_len - 4;
        if payload_start > payload_end {
            return Err("frame headers overrun payload".to_string());
        }

        if payload_start < payload_end {
            let payload = &buffer[payload_start..payload_end];
            let value: Value = serde_json::from_slice(payload)
                .map_err(|e| format!("frame payload is not JSON: {e}"))?;
            payloads.push(value);
        }
        buffer.advance(total_len);
    }
}

/// Decode a converse-stream body.
///
/// Event payloads are dispatched by shape: `delta.text` is a content
/// increment, `usage` is the metadata trailer, `stopReason` closes the
/// message. The final normalized chunk carries the accumulated usage.
fn decode_converse_stream(response: reqwest::Response) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut buffer = BytesMut::new();
        let mut usage = Usage::default();
        let mut finish = FinishReason::Stop;

        while let Some(frame) = body.next().await {
            let bytes = match frame {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(GatewayError::TransientNetwork(format!(
                        "stream interrupted: {e}"
                    )));
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            let payloads = match drain_frames(&mut buffer) {
                Ok(p) => p,
                Err(message) => {
                    yield Err(GatewayError::ProviderProtocolError {
                        provider: ProviderId::Bedrock,
                        message,
                    });
                    return;
                }
            };
            for value in payloads {
                if let Some(text) = value
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                {
                    if !text.is_empty() {
                        yield Ok(StreamChunk::delta(text));
                    }
                }
                if let Some(u) = extract_usage(&value) {
                    usage.merge(&u);
                }
                if let Some(reason) = value.get("stopReason").and_then(Value::as_str) {
                    finish = map_stop_reason(reason);
                }
            }
        }

        yield Ok(StreamChunk::finish(usage, finish));
    };
    Box::pin(stream)
}

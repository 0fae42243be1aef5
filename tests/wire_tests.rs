//! Wire-level provider tests against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stratum_gateway::catalog::Catalog;
use stratum_gateway::error::GatewayError;
use stratum_gateway::providers::{AnthropicProvider, OpenAiCompatProvider, Provider};
use stratum_gateway::types::{ChatRequest, FinishReason, Message, ProviderId};

const TIMEOUT: Duration = Duration::from_secs(5);

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::with_defaults())
}

fn compat_provider(server: &MockServer, id: ProviderId) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        id,
        "test-key".to_string(),
        Some(server.uri()),
        catalog(),
        TIMEOUT,
    )
    .unwrap()
}

fn anthropic_provider(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(
        "test-key".to_string(),
        Some(server.uri()),
        catalog(),
        TIMEOUT,
    )
    .unwrap()
}

// ==================== OpenAI-compatible wire ====================

#[tokio::test]
async fn compat_complete_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "llama-3.1-8b-instant" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "llama-3.1-8b-instant",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "4" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = compat_provider(&server, ProviderId::Groq);
    let request = ChatRequest::new("llama-3.1-8b-instant", vec![Message::user("What is 2+2?")]);
    let response = provider.complete(&request).await.unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.provider, ProviderId::Groq);
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert!(!response.usage.estimated);
}

#[tokio::test]
async fn compat_stream_yields_final_usage_chunk() {
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"it\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" is 4\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "stream": true,
            "stream_options": { "include_usage": true }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = compat_provider(&server, ProviderId::Groq);
    let request =
        ChatRequest::new("llama-3.1-8b-instant", vec![Message::user("What is 2+2?")]).streaming();
    let mut stream = provider.stream(&request).await.unwrap();

    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        chunks.push(item.unwrap());
    }

    let text: String = chunks.iter().map(|c| c.delta.as_str()).collect();
    assert_eq!(text, "it is 4");

    let last = chunks.last().unwrap();
    assert!(last.is_final());
    assert_eq!(last.finish_reason, Some(FinishReason::Stop));
    let usage = last.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 12);
    assert_eq!(usage.completion_tokens, 3);
    assert!(!usage.estimated);
    assert_eq!(chunks.iter().filter(|c| c.is_final()).count(), 1);
}

#[tokio::test]
async fn compat_stream_without_usage_estimates() {
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = compat_provider(&server, ProviderId::DeepSeek);
    let request = ChatRequest::new("deepseek-chat", vec![Message::user("hi")]).streaming();
    let chunks: Vec<_> = provider
        .stream(&request)
        .await
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
        .await;

    let last = chunks.last().unwrap();
    assert!(last.usage.unwrap().estimated);
}

#[tokio::test]
async fn compat_rate_limit_maps_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let provider = compat_provider(&server, ProviderId::Groq);
    let request = ChatRequest::new("llama-3.1-8b-instant", vec![Message::user("hi")]);
    let err = provider.complete(&request).await.unwrap_err();

    assert!(matches!(
        err,
        GatewayError::RateLimited {
            provider: ProviderId::Groq,
            retry_after: Some(d),
        } if d == Duration::from_secs(2)
    ));
}

#[tokio::test]
async fn compat_auth_rejection_maps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let provider = compat_provider(&server, ProviderId::Xai);
    let request = ChatRequest::new("grok-2-1212", vec![Message::user("hi")]);
    let err = provider.complete(&request).await.unwrap_err();
    assert!(matches!(err, GatewayError::AuthRejected { .. }));
}

#[tokio::test]
async fn compat_model_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "llama-3.1-8b-instant" }, { "id": "llama-3.3-70b-versatile" }]
        })))
        .mount(&server)
        .await;

    let provider = compat_provider(&server, ProviderId::Groq);
    let models = provider.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert!(models.contains(&"llama-3.1-8b-instant".to_string()));
}

// ==================== Anthropic wire ====================

#[tokio::test]
async fn anthropic_complete_sends_cache_directive_and_decodes_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({
            "system": [{
                "type": "text",
                "text": "You are terse.",
                "cache_control": { "type": "ephemeral" }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-20241022",
            "content": [{ "type": "text", "text": "4" }],
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 5,
                "output_tokens": 1,
                "cache_creation_input_tokens": 50,
                "cache_read_input_tokens": 0
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = anthropic_provider(&server);
    let request = ChatRequest::new(
        "claude-3-5-sonnet-20241022",
        vec![
            Message::system("You are terse.").with_cache_hint(),
            Message::user("What is 2+2?"),
        ],
    );
    let response = provider.complete(&request).await.unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.usage.cache_write_tokens, 50);
    assert_eq!(response.usage.prompt_tokens, 5);
}

#[tokio::test]
async fn anthropic_stream_accumulates_usage_across_events() {
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"It is \"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"4.\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":6}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = anthropic_provider(&server);
    let request = ChatRequest::new(
        "claude-3-5-sonnet-20241022",
        vec![Message::user("What is 2+2?")],
    )
    .streaming();
    let chunks: Vec<_> = provider
        .stream(&request)
        .await
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
        .await;

    let text: String = chunks.iter().map(|c| c.delta.as_str()).collect();
    assert_eq!(text, "It is 4.");

    let last = chunks.last().unwrap();
    assert!(last.is_final());
    assert_eq!(last.finish_reason, Some(FinishReason::Stop));
    let usage = last.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 25);
    assert_eq!(usage.completion_tokens, 6);
}

#[tokio::test]
async fn anthropic_malformed_stream_surfaces_protocol_error() {
    let body = "data: this is not json\n\n";
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = anthropic_provider(&server);
    let request = ChatRequest::new(
        "claude-3-5-sonnet-20241022",
        vec![Message::user("hi")],
    )
    .streaming();
    let mut stream = provider.stream(&request).await.unwrap();
    let first = stream.next().await.unwrap();
    assert!(matches!(
        first.unwrap_err(),
        GatewayError::ProviderProtocolError { .. }
    ));
}

#[tokio::test]
async fn anthropic_upstream_error_maps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let provider = anthropic_provider(&server);
    let request = ChatRequest::new(
        "claude-3-5-sonnet-20241022",
        vec![Message::user("hi")],
    );
    let err = provider.complete(&request).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::UpstreamServerError { status: 500, .. }
    ));
}

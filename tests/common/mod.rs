//! Shared fixtures: a scriptable mock provider and a scenario catalog.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use stratum_gateway::error::{GatewayError, Result};
use stratum_gateway::providers::Provider;
use stratum_gateway::types::{
    Capability, ChatRequest, ChatResponse, ChunkStream, FinishReason, ProviderId, StreamChunk,
    Usage,
};
use stratum_gateway::{Dispatcher, GatewayConfig};

/// One scripted outcome for a mock call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with this content
    Reply(String),
    /// Fail with vendor backpressure
    RateLimited { retry_after: Option<Duration> },
    /// Fail with a 5xx
    Upstream(u16),
    /// Fail authentication
    AuthRejected,
    /// Never answer (for deadline tests)
    Hang,
}

impl MockOutcome {
    fn into_error(self, provider: ProviderId) -> GatewayError {
        match self {
            MockOutcome::Reply(_) => unreachable!("reply is not an error"),
            MockOutcome::RateLimited { retry_after } => GatewayError::RateLimited {
                provider,
                retry_after,
            },
            MockOutcome::Upstream(status) => GatewayError::UpstreamServerError {
                provider,
                status,
                message: "scripted failure".to_string(),
            },
            MockOutcome::AuthRejected => GatewayError::AuthRejected {
                provider,
                message: "scripted rejection".to_string(),
            },
            MockOutcome::Hang => unreachable!("hang never resolves to an error"),
        }
    }
}

/// A provider whose behavior is a queue of scripted outcomes. When the
/// queue runs dry the last outcome repeats.
pub struct MockProvider {
    id: ProviderId,
    script: Mutex<VecDeque<MockOutcome>>,
    last: Mutex<Option<MockOutcome>>,
    pub calls: AtomicU32,
    usage: Usage,
}

impl MockProvider {
    pub fn new(id: ProviderId, script: Vec<MockOutcome>) -> Self {
        Self {
            id,
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            usage: Usage::new(100, 20),
        }
    }

    pub fn replying(id: ProviderId, content: &str) -> Self {
        Self::new(id, vec![MockOutcome::Reply(content.to_string())])
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if let Some(outcome) = script.pop_front() {
            *self.last.lock() = Some(outcome.clone());
            outcome
        } else {
            self.last
                .lock()
                .clone()
                .expect("mock provider called with an empty script")
        }
    }

    fn response(&self, request: &ChatRequest, content: String) -> ChatResponse {
        ChatResponse {
            content,
            model: request.model.clone(),
            provider: self.id,
            usage: self.usage,
            cost_usd: 0.0,
            latency_ms: 1,
            finish_reason: FinishReason::Stop,
            created_at: Utc::now(),
            cost_breakdown: None,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match self.next_outcome() {
            MockOutcome::Reply(content) => Ok(self.response(request, content)),
            MockOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Cancelled)
            }
            other => Err(other.into_error(self.id)),
        }
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        match self.next_outcome() {
            MockOutcome::Reply(content) => {
                let usage = self.usage;
                let words: Vec<String> =
                    content.split_whitespace().map(str::to_string).collect();
                let _ = request;
                let stream = async_stream::stream! {
                    for (i, word) in words.iter().enumerate() {
                        let delta = if i == 0 { word.clone() } else { format!(" {word}") };
                        yield Ok(StreamChunk::delta(delta));
                    }
                    yield Ok(StreamChunk::finish(usage, FinishReason::Stop));
                };
                Ok(Box::pin(stream))
            }
            MockOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Cancelled)
            }
            other => Err(other.into_error(self.id)),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }

    fn supports(&self, _model: &str, _capability: Capability) -> bool {
        true
    }
}

/// Scenario catalog: three models spanning the price/quality range, with
/// real prices.
pub fn scenario_catalog_json() -> String {
    serde_json::json!({
        "version": "scenario",
        "providers": {
            "openai": {
                "gpt-4o-mini": {
                    "context_window": 128000,
                    "output_ceiling": 16384,
                    "input_price_per_mtok": 0.15,
                    "output_price_per_mtok": 0.60,
                    "cache_read_price_per_mtok": 0.075,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.66,
                    "latency_class": "fast"
                }
            },
            "groq": {
                "llama-3.1-8b-instant": {
                    "context_window": 131072,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.05,
                    "output_price_per_mtok": 0.08,
                    "capabilities": {"tools": true},
                    "quality_score": 0.45,
                    "latency_class": "ultra"
                }
            },
            "anthropic": {
                "claude-3-5-sonnet-20241022": {
                    "context_window": 200000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 3.0,
                    "output_price_per_mtok": 15.0,
                    "cache_write_price_per_mtok": 3.75,
                    "cache_read_price_per_mtok": 0.30,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.88,
                    "latency_class": "standard"
                }
            }
        }
    })
    .to_string()
}

/// Dispatcher over the scenario catalog with fast retries and no jitter.
pub fn scenario_dispatcher(tempdir: &tempfile::TempDir) -> Dispatcher {
    let catalog_path = tempdir.path().join("catalog.json");
    std::fs::write(&catalog_path, scenario_catalog_json()).unwrap();

    let mut config = GatewayConfig::default();
    config.catalog_path = Some(catalog_path);
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter_ratio = 0.0;
    Dispatcher::new(config).unwrap()
}

/// Install a mock and return a handle for call-count assertions.
pub fn install_mock(dispatcher: &Dispatcher, mock: MockProvider) -> Arc<MockProvider> {
    let mock = Arc::new(mock);
    dispatcher.providers().register(mock.clone());
    mock
}

//! # Stratum Gateway
//!
//! A provider-agnostic LLM gateway request core: one chat-completion
//! contract over a heterogeneous set of vendors, hiding wire, pricing,
//! capability, and latency differences.
//!
//! ## Features
//!
//! - **Unified interface**: one normalized request/response shape for
//!   OpenAI, Anthropic, Google, DeepSeek, Groq, xAI, OpenRouter, a local
//!   Ollama daemon, and AWS Bedrock
//! - **Cost/quality/latency routing**: an ordered candidate chain scored
//!   under four strategies with hard constraints
//! - **Response caching**: bounded, TTL-expiring in-process cache with
//!   correct zero-cost accounting on hits
//! - **Streaming**: normalized token-by-token chunks with an authoritative
//!   usage-bearing final chunk, regardless of vendor framing
//! - **Retry with ordered fallback**: exponential backoff across models and
//!   providers, stream-aware (never splices two voices mid-stream)
//! - **Budget enforcement**: per-session pre-flight gate, post-flight
//!   accounting, and alert events
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stratum_gateway::{Dispatcher, GatewayConfig, ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::new(GatewayConfig::from_env()?)?;
//!
//!     let request = ChatRequest::new(
//!         "gpt-4o-mini",
//!         vec![Message::user("What is the capital of France?")],
//!     )
//!     .with_session("demo");
//!
//!     let response = dispatcher.dispatch(request).await?;
//!     println!("{} (${:.6})", response.content, response.cost_usd);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod budget;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod dispatcher;
pub mod error;
pub mod providers;
pub mod retry;
pub mod router;
pub mod types;
pub mod utils;

// Re-export the caller-facing surface.
pub use budget::{BudgetConfig, BudgetEvent, CallRecord, SessionSummary};
pub use cache::{CacheConfig, CacheStats};
pub use catalog::{Catalog, CatalogDocument, LatencyClass, ModelEntry};
pub use config::{GatewayConfig, ProviderSettings};
pub use cost::CostBreakdown;
pub use dispatcher::{Dispatcher, RouteOptions};
pub use error::{GatewayError, Result, RetryClass};
pub use providers::{Provider, ProviderRegistry};
pub use retry::RetryConfig;
pub use router::{Constraints, RouteCandidate, RouterConfig, RouteStrategy};
pub use types::{
    CachePolicy, Capability, ChatRequest, ChatResponse, ChunkStream, ContentPart, FinishReason,
    Message, MessageRole, ProviderId, StreamChunk, ToolSpec, Usage,
};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

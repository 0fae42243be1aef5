//! Normalized response and stream chunk types

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::common::ProviderId;
use super::usage::Usage;
use crate::cost::CostBreakdown;
use crate::error::Result;

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Output token ceiling reached
    Length,
    /// The model invoked a tool
    ToolCalls,
    /// Vendor content filter intervened
    ContentFilter,
    /// Caller cancelled or the call timed out
    Cancelled,
    /// The call failed before finishing
    Error,
}

/// A completed chat response.
///
/// `model` is the model that actually ran, which differs from the requested
/// one when a fallback fired; `provider` records where it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub provider: ProviderId,
    pub usage: Usage,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub finish_reason: FinishReason,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_breakdown: Option<CostBreakdown>,
}

impl ChatResponse {
    /// Whether this response was served from the gateway response cache.
    pub fn from_cache(&self) -> bool {
        self.cost_breakdown
            .as_ref()
            .map(|b| b.from_cache)
            .unwrap_or(false)
    }
}

/// One streamed increment.
///
/// Intermediate chunks carry only `delta`; the final chunk of every stream
/// carries the authoritative `usage` and a `finish_reason`, and nothing
/// follows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub delta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            ..Default::default()
        }
    }

    pub fn finish(usage: Usage, reason: FinishReason) -> Self {
        Self {
            delta: String::new(),
            usage: Some(usage),
            finish_reason: Some(reason),
        }
    }

    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Lazy, finite, non-restartable sequence of chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

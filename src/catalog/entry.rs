//! Catalog entry types and model-id validation

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{Capability, ProviderId};

/// Coarse latency bucket assigned per model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    Ultra,
    Fast,
    #[default]
    Standard,
    Slow,
}

impl LatencyClass {
    /// Ordering rank, ultra < fast < standard < slow.
    pub fn rank(&self) -> u8 {
        match self {
            LatencyClass::Ultra => 0,
            LatencyClass::Fast => 1,
            LatencyClass::Standard => 2,
            LatencyClass::Slow => 3,
        }
    }
}

/// Capability flags declared per model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCapabilities {
    pub vision: bool,
    pub tools: bool,
    pub reasoning: bool,
    pub prompt_cache: bool,
}

impl ModelCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Vision => self.vision,
            Capability::Tools => self.tools,
            Capability::Reasoning => self.reasoning,
            Capability::PromptCache => self.prompt_cache,
        }
    }
}

/// One catalog entry per `(provider, model)` pair.
///
/// `provider` and `model` are the document keys; the loader fills them in
/// after deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    #[serde(skip)]
    pub provider: ProviderId,
    #[serde(skip)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub context_window: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ceiling: Option<u32>,

    /// USD per million input tokens
    pub input_price_per_mtok: f64,
    /// USD per million output tokens
    pub output_price_per_mtok: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_price_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_price_per_mtok: Option<f64>,

    #[serde(default)]
    pub capabilities: ModelCapabilities,

    /// Task-performance score in [0, 1]
    #[serde(default = "default_quality_score")]
    pub quality_score: f64,
    #[serde(default)]
    pub latency_class: LatencyClass,

    /// Reasoning models pin temperature and ignore the request field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_temperature: Option<f32>,

    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_model: Option<String>,
}

fn default_quality_score() -> f64 {
    0.5
}

impl ModelEntry {
    /// Average of input and output price, the cost-strategy ordering key.
    pub fn blended_price(&self) -> f64 {
        (self.input_price_per_mtok + self.output_price_per_mtok) / 2.0
    }

    /// Highest temperature this entry accepts; pinned models override the
    /// provider band.
    pub fn max_temperature(&self) -> f32 {
        self.fixed_temperature
            .unwrap_or_else(|| self.provider.max_temperature())
    }

    /// Temperature to send on the wire. Reasoning models ignore the caller
    /// value entirely.
    pub fn effective_temperature(&self, requested: f32) -> f32 {
        self.fixed_temperature.unwrap_or(requested)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.supports(capability)
    }
}

// Dated-ID patterns, per provider family. OpenAI dates with dashes
// (`gpt-4o-2024-08-06`), Anthropic with a compact suffix
// (`claude-3-5-sonnet-20241022`), Bedrock wraps Anthropic ids with a
// namespace and revision (`anthropic.claude-3-5-sonnet-20241022-v2:0`).
static OPENAI_DATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d{4}-\d{2}-\d{2}$").expect("static pattern"));
static ANTHROPIC_DATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d{8}$").expect("static pattern"));
static BEDROCK_DATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d{8}(-v\d+)?(:\d+)?$").expect("static pattern"));
static GOOGLE_VERSIONED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^gemini-\d+(\.\d+)?-[a-z-]+(-\d{3})?$").expect("static pattern"));

/// Stable aliases explicitly permitted alongside dated identifiers.
pub const STABLE_ALIASES: &[(&str, ProviderId)] = &[
    ("gpt-4o", ProviderId::OpenAi),
    ("gpt-4o-mini", ProviderId::OpenAi),
    ("deepseek-chat", ProviderId::DeepSeek),
    ("deepseek-reasoner", ProviderId::DeepSeek),
];

/// Check a model id against its provider's naming convention.
///
/// Providers without a dated convention (Groq, xAI, OpenRouter, Ollama)
/// accept any non-empty identifier.
pub fn validate_model_id(provider: ProviderId, model: &str) -> bool {
    if model.is_empty() {
        return false;
    }
    if STABLE_ALIASES
        .iter()
        .any(|(alias, p)| *alias == model && *p == provider)
    {
        return true;
    }
    match provider {
        ProviderId::OpenAi => OPENAI_DATED.is_match(model),
        ProviderId::Anthropic => ANTHROPIC_DATED.is_match(model),
        ProviderId::Bedrock => BEDROCK_DATED.is_match(model),
        ProviderId::Google => GOOGLE_VERSIONED.is_match(model),
        ProviderId::DeepSeek => false,
        ProviderId::Groq | ProviderId::Xai | ProviderId::OpenRouter | ProviderId::Ollama => true,
    }
}

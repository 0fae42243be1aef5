//! Provider identity and capability tags

use serde::{Deserialize, Serialize};

/// Identifies a provider family the gateway can dispatch to.
///
/// Each variant owns exactly one wire implementation; OpenAI-compatible
/// vendors (Groq, DeepSeek, xAI, OpenRouter, Google's compat endpoint) share
/// a parameterized strategy but remain distinct identities for routing,
/// credentials, and accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    #[default]
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    Groq,
    Xai,
    OpenRouter,
    Ollama,
    Bedrock,
}

impl ProviderId {
    /// Stable string form used in catalog documents and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Groq => "groq",
            ProviderId::Xai => "xai",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Ollama => "ollama",
            ProviderId::Bedrock => "bedrock",
        }
    }

    /// Parse the catalog/document string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderId::OpenAi),
            "anthropic" => Some(ProviderId::Anthropic),
            "google" => Some(ProviderId::Google),
            "deepseek" => Some(ProviderId::DeepSeek),
            "groq" => Some(ProviderId::Groq),
            "xai" => Some(ProviderId::Xai),
            "openrouter" => Some(ProviderId::OpenRouter),
            "ollama" => Some(ProviderId::Ollama),
            "bedrock" => Some(ProviderId::Bedrock),
            _ => None,
        }
    }

    /// Environment variable holding this provider's credential.
    ///
    /// Ollama uses a base URL rather than a key; Bedrock follows the
    /// standard AWS credential chain.
    pub fn credential_env_var(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::Google => "GOOGLE_API_KEY",
            ProviderId::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderId::Groq => "GROQ_API_KEY",
            ProviderId::Xai => "XAI_API_KEY",
            ProviderId::OpenRouter => "OPENROUTER_API_KEY",
            ProviderId::Ollama => "OLLAMA_BASE_URL",
            ProviderId::Bedrock => "AWS_ACCESS_KEY_ID",
        }
    }

    /// Highest temperature the provider accepts.
    pub fn max_temperature(&self) -> f32 {
        match self {
            ProviderId::Anthropic | ProviderId::Bedrock => 1.0,
            _ => 2.0,
        }
    }

    /// All known providers, in catalog order.
    pub fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenAi,
            ProviderId::Anthropic,
            ProviderId::Google,
            ProviderId::DeepSeek,
            ProviderId::Groq,
            ProviderId::Xai,
            ProviderId::OpenRouter,
            ProviderId::Ollama,
            ProviderId::Bedrock,
        ]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model capability a request may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Image inputs in the message list
    Vision,
    /// Tool / function calling
    Tools,
    /// Extended reasoning models
    Reasoning,
    /// Vendor-side prompt caching directives
    PromptCache,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::Vision => "vision",
            Capability::Tools => "tools",
            Capability::Reasoning => "reasoning",
            Capability::PromptCache => "prompt_cache",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_round_trip() {
        for p in ProviderId::all() {
            assert_eq!(ProviderId::parse(p.as_str()), Some(*p));
        }
    }

    #[test]
    fn test_provider_temperature_bands() {
        assert_eq!(ProviderId::Anthropic.max_temperature(), 1.0);
        assert_eq!(ProviderId::OpenAi.max_temperature(), 2.0);
        assert_eq!(ProviderId::Groq.max_temperature(), 2.0);
    }

    #[test]
    fn test_credential_env_vars() {
        assert_eq!(ProviderId::OpenAi.credential_env_var(), "OPENAI_API_KEY");
        assert_eq!(ProviderId::Ollama.credential_env_var(), "OLLAMA_BASE_URL");
    }
}

//! Normalized chat request

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;

/// Caching behavior requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Read from and write to the response cache when eligible
    #[default]
    ReadWrite,
    /// Skip the lookup but store the result
    Bypass,
    /// Neither read nor store
    NoStore,
}

impl CachePolicy {
    pub fn allows_read(&self) -> bool {
        matches!(self, CachePolicy::ReadWrite)
    }

    pub fn allows_store(&self) -> bool {
        !matches!(self, CachePolicy::NoStore)
    }
}

/// A tool the model may invoke, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the tool's parameters
    pub parameters: Value,
}

/// A normalized chat-completion request.
///
/// `model` names the caller's preferred model; the router may substitute a
/// different candidate, in which case the response reports the model that
/// actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default)]
    pub cache_policy: CachePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn default_temperature() -> f32 {
    1.0
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_output_tokens: None,
            top_p: None,
            stop: Vec::new(),
            stream: false,
            tools: None,
            cache_policy: CachePolicy::default(),
            session_id: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Whether any message carries an inline image.
    pub fn has_images(&self) -> bool {
        self.messages.iter().any(Message::has_images)
    }

    /// Whether any message is marked as a reusable cache prefix.
    pub fn has_cache_hints(&self) -> bool {
        self.messages.iter().any(|m| m.cache_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::MessageRole;

    #[test]
    fn test_request_defaults() {
        let req = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        assert_eq!(req.temperature, 1.0);
        assert!(!req.stream);
        assert_eq!(req.cache_policy, CachePolicy::ReadWrite);
        assert!(req.stop.is_empty());
    }

    #[test]
    fn test_cache_policy_semantics() {
        assert!(CachePolicy::ReadWrite.allows_read());
        assert!(CachePolicy::ReadWrite.allows_store());
        assert!(!CachePolicy::Bypass.allows_read());
        assert!(CachePolicy::Bypass.allows_store());
        assert!(!CachePolicy::NoStore.allows_read());
        assert!(!CachePolicy::NoStore.allows_store());
    }

    #[test]
    fn test_builders() {
        let req = ChatRequest::new("m", vec![Message::user("q")])
            .with_temperature(0.2)
            .with_max_output_tokens(256)
            .with_session("s-1")
            .streaming();
        assert_eq!(req.temperature, 0.2);
        assert_eq!(req.max_output_tokens, Some(256));
        assert_eq!(req.session_id.as_deref(), Some("s-1"));
        assert!(req.stream);
    }

    #[test]
    fn test_serde_defaults_fill_in() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"model":"gpt-4o-mini","messages":[{"role":"user","content":[{"type":"text","text":"hi"}]}]}"#,
        )
        .unwrap();
        assert_eq!(req.temperature, 1.0);
        assert_eq!(req.messages[0].role, MessageRole::User);
    }
}

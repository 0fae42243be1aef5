//! Chat message types
//!
//! Messages are provider-neutral; images travel inline as typed base64
//! payloads and each strategy decides how to render them on the wire.

use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// One segment of message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },
    /// Inline image, base64-encoded
    Image { mime: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(mime: impl Into<String>, data: impl Into<String>) -> Self {
        ContentPart::Image {
            mime: mime.into(),
            data: data.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }
}

/// A normalized chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role
    pub role: MessageRole,
    /// Content segments, in order
    pub content: Vec<ContentPart>,
    /// Optional author name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Marks the segment as a stable reusable prefix; strategies that
    /// support vendor prompt caching emit the matching directive.
    #[serde(default)]
    pub cache_hint: bool,
}

impl Message {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::text(text)],
            name: None,
            cache_hint: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, text)
    }

    /// Mark this message as a reusable cache prefix.
    pub fn with_cache_hint(mut self) -> Self {
        self.cache_hint = true;
        self
    }

    /// Append an inline image segment from an already-encoded payload.
    pub fn with_image(mut self, mime: impl Into<String>, data: impl Into<String>) -> Self {
        self.content.push(ContentPart::image(mime, data));
        self
    }

    /// Append an inline image segment from raw bytes.
    pub fn with_image_bytes(self, mime: impl Into<String>, bytes: &[u8]) -> Self {
        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.with_image(mime, data)
    }

    /// Concatenated text segments, ignoring images.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// Whether any segment is an image.
    pub fn has_images(&self) -> bool {
        self.content.iter().any(ContentPart::is_image)
    }
}

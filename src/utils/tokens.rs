//! Token estimation heuristic
//!
//! Approximately 4 characters per token, which tracks real tokenizers well
//! enough for context-window filtering and conservative budget pre-flight.
//! Never used for billing when the vendor reports usage.

use crate::types::{ChatRequest, ContentPart, Message};

/// Per-message wire overhead (role tags, separators).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Flat charge for an inline image; vendors bill low-detail images around
/// this figure.
const IMAGE_TOKENS: u32 = 765;

/// Estimate tokens for a text fragment.
pub fn estimate_str(text: &str) -> u32 {
    (text.chars().count() as f64 / 4.0).ceil() as u32
}

/// Estimate tokens for one message, including images.
pub fn estimate_message(message: &Message) -> u32 {
    let mut tokens = MESSAGE_OVERHEAD_TOKENS;
    for part in &message.content {
        match part {
            ContentPart::Text { text } => tokens += estimate_str(text),
            ContentPart::Image { .. } => tokens += IMAGE_TOKENS,
        }
    }
    tokens
}

/// Estimate prompt tokens for a whole request.
pub fn estimate_request(request: &ChatRequest) -> u32 {
    request.messages.iter().map(estimate_message).sum()
}

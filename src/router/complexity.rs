//! Request complexity scoring
//!
//! A bounded [0, 1] scalar summarizing the reasoning load of a request,
//! used by the Hybrid strategy to shift weight from price toward quality.
//! The reference constants are fixed properties of the design, not
//! per-deployment tunables.

use crate::types::{ChatRequest, ContentPart};

/// Cues that a prompt wants actual reasoning rather than recall.
const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "architect",
    "compare",
    "debug",
    "demonstrate",
    "derive",
    "design",
    "evaluate",
    "explain",
    "formalize",
    "implement",
    "justify",
    "optimize",
    "prove",
    "reason",
    "refactor",
    "solve",
    "theorem",
];

/// Keyword count at which the reasoning term saturates.
const K_REF: f64 = 6.0;
/// Character count at which the length term saturates.
const L_REF: f64 = 2000.0;
/// Turn count at which the conversation term saturates.
const T_REF: f64 = 10.0;
/// Technical-symbol density threshold for the code indicator.
const SYMBOL_TAU: f64 = 0.02;
/// Math-symbol density threshold for the math indicator.
const MATH_MU: f64 = 0.01;

const SYMBOL_CHARS: &[char] = &['{', '}', '(', ')', ';', '=', '<', '>', '[', ']', '&', '|'];
const MATH_CHARS: &[char] = &[
    '=', '+', '*', '/', '^', '√', '∑', '∏', '∫', '≤', '≥', '≠', '±', '∞', 'π',
];

fn request_text(request: &ChatRequest) -> String {
    let mut text = String::new();
    for message in &request.messages {
        for part in &message.content {
            if let ContentPart::Text { text: t } = part {
                text.push_str(t);
                text.push('\n');
            }
        }
    }
    text
}

fn keyword_count(text: &str) -> usize {
    REASONING_KEYWORDS
        .iter()
        .map(|kw| text.matches(kw).count())
        .sum()
}

fn density(text: &str, set: &[char]) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let hits = text.chars().filter(|c| set.contains(c)).count();
    hits as f64 / total as f64
}

/// Score a request's complexity in [0, 1].
///
/// Weighted blend: 0.40 reasoning keywords, 0.20 length, 0.20 code
/// indicator, 0.10 turn count, 0.10 math indicator.
pub fn complexity_score(request: &ChatRequest) -> f64 {
    let text = request_text(request).to_lowercase();
    let chars = text.chars().count() as f64;

    let keyword_term = (keyword_count(&text) as f64 / K_REF).min(1.0);
    let length_term = (chars / L_REF).min(1.0);

    let has_code = text.contains("```") || density(&text, SYMBOL_CHARS) > SYMBOL_TAU;
    let code_term = if has_code { 1.0 } else { 0.0 };

    let turn_term = (request.messages.len() as f64 / T_REF).min(1.0);

    let math_term = if density(&text, MATH_CHARS) > MATH_MU {
        1.0
    } else {
        0.0
    };

    0.40 * keyword_term + 0.20 * length_term + 0.20 * code_term + 0.10 * turn_term
        + 0.10 * math_term
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn req(text: &str) -> ChatRequest {
        ChatRequest::new("gpt-4o-mini", vec![Message::user(text)])
    }

    #[test]
    fn test_trivial_prompt_scores_low() {
        let score = complexity_score(&req("What is 2+2?"));
        assert!(score < 0.3, "score was {score}");
    }

    #[test]
    fn test_reasoning_prompt_scores_high() {
        let score = complexity_score(&req(
            "Prove that √2 is irrational. Derive the contradiction formally, \
             explain each step, and analyze where the argument would break for √4. \
             Then design a generalization and justify it: a^2 = 2*b^2 has no integer \
             solutions, demonstrate why, evaluate alternative proofs, and reason about \
             which is clearest. Sketch it in code:\n```\nassert sqrt(2) ** 2 != 2\n```",
        ));
        assert!(score >= 0.6, "score was {score}");
    }

    #[test]
    fn test_code_fence_trips_indicator() {
        let plain = complexity_score(&req("please look at this"));
        let fenced = complexity_score(&req("please look at this\n```rust\nfn main() {}\n```"));
        assert!(fenced > plain);
    }

    #[test]
    fn test_score_bounded() {
        let long = "analyze prove derive explain design optimize ".repeat(200);
        let score = complexity_score(&req(&long));
        assert!((0.0..=1.0).contains(&score));

        let empty = ChatRequest::new("m", vec![Message::user("")]);
        assert!(complexity_score(&empty) >= 0.0);
    }

    #[test]
    fn test_turn_count_contributes() {
        let mut messages = Vec::new();
        for i in 0..12 {
            messages.push(Message::user(format!("turn {i}")));
        }
        let many = ChatRequest::new("m", messages);
        let one = req("turn 0");
        assert!(complexity_score(&many) > complexity_score(&one));
    }

    #[test]
    fn test_deterministic() {
        let r = req("Prove that √2 is irrational.");
        assert_eq!(complexity_score(&r), complexity_score(&r));
    }
}

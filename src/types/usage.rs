//! Token usage accounting

use serde::{Deserialize, Serialize};

/// Token counts for one completed call.
///
/// `prompt_tokens` counts everything the model read, including cache reads:
/// `prompt_tokens = uncached_prompt_tokens + cache_read_tokens`. Cache writes
/// are tracked separately and are not part of `prompt_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    /// Tokens the vendor served from its automatic prefix cache (OpenAI
    /// style); billed as free in the accounting formula.
    #[serde(default)]
    pub cached_prompt_tokens: u32,
    /// Tokens written to an explicit prompt cache this call
    #[serde(default)]
    pub cache_write_tokens: u32,
    /// Tokens read back from an explicit prompt cache this call
    #[serde(default)]
    pub cache_read_tokens: u32,
    /// Hidden reasoning tokens (billed as output by vendors that report them)
    #[serde(default)]
    pub reasoning_tokens: u32,
    /// True when the counts were derived from the tokenizer heuristic
    /// because the vendor reported no usage.
    #[serde(default)]
    pub estimated: bool,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            ..Default::default()
        }
    }

    /// Prompt tokens that were actually processed fresh this call.
    pub fn uncached_prompt_tokens(&self) -> u32 {
        self.prompt_tokens
            .saturating_sub(self.cache_read_tokens)
            .saturating_sub(self.cached_prompt_tokens)
    }

    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Fold another usage report into this one (used when accumulating
    /// stream deltas that arrive split across events).
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.max(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.max(other.completion_tokens);
        self.cached_prompt_tokens = self.cached_prompt_tokens.max(other.cached_prompt_tokens);
        self.cache_write_tokens = self.cache_write_tokens.max(other.cache_write_tokens);
        self.cache_read_tokens = self.cache_read_tokens.max(other.cache_read_tokens);
        self.reasoning_tokens = self.reasoning_tokens.max(other.reasoning_tokens);
        self.estimated |= other.estimated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncached_prompt_tokens() {
        let usage = Usage {
            prompt_tokens: 1000,
            cache_read_tokens: 600,
            cached_prompt_tokens: 100,
            ..Default::default()
        };
        assert_eq!(usage.uncached_prompt_tokens(), 300);
    }

    #[test]
    fn test_uncached_saturates() {
        let usage = Usage {
            prompt_tokens: 100,
            cache_read_tokens: 200,
            ..Default::default()
        };
        assert_eq!(usage.uncached_prompt_tokens(), 0);
    }

    #[test]
    fn test_merge_takes_maxima() {
        let mut a = Usage::new(100, 0);
        let b = Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            cache_read_tokens: 40,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.completion_tokens, 50);
        assert_eq!(a.cache_read_tokens, 40);
        assert_eq!(a.prompt_tokens, 100);
    }
}

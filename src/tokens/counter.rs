//! Token counter implementations.

use crate::types::{Message, Request};

/// Per-message framing overhead (role markers, separators).
const MESSAGE_OVERHEAD: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn count_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.count(&m.content) + MESSAGE_OVERHEAD)
            .sum()
    }

    /// Prompt-side estimate for a whole request, system prompt included.
    fn count_request(&self, request: &Request) -> usize {
        let system = request
            .system_prompt
            .as_deref()
            .map(|s| self.count(s) + MESSAGE_OVERHEAD)
            .unwrap_or(0);
        system + self.count_messages(&request.messages)
    }
}

#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: f64,
}

impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(4.0)
    }

    pub fn with_ratio(r: f64) -> Self {
        Self { chars_per_token: r }
    }
}

impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Character count divided by four, rounded up.
pub fn estimate_token_count(text: &str) -> usize {
    CharacterEstimator::new().count(text)
}

#![deny(missing_docs)]
//! Context-window compaction strategies.
//!
//! The ReAct runtime asks a [`ContextStrategy`] whether the assembled
//! message list needs trimming before each `think` call and, if so, asks
//! it to produce a shorter list. Compaction here is purely client-side
//! bookkeeping — a provider's own native truncation (if any) is invisible
//! to the strategy and handled inside the `Provider` implementation.

use fulcrum_provider::{ContentPart, ProviderMessage};

/// Strategy for managing context window size.
pub trait ContextStrategy: Send + Sync {
    /// Estimate the token count of a message list.
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize;

    /// Whether compaction should run given the current messages and limit.
    fn should_compact(&self, messages: &[ProviderMessage], limit: usize) -> bool;

    /// Compact the message list, returning a shorter (or unchanged) list.
    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage>;
}

fn estimate_part_chars(part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } => text.len(),
        ContentPart::ToolUse { input, .. } => input.to_string().len(),
        ContentPart::ToolResult { content, .. } => content.len(),
        ContentPart::Image { .. } => 4000,
    }
}

/// A no-op context strategy that never compacts.
///
/// Useful for short conversations or when the provider handles
/// truncation natively.
pub struct NoCompaction;

impl ContextStrategy for NoCompaction {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        messages
            .iter()
            .flat_map(|m| &m.content)
            .map(|part| estimate_part_chars(part) / 4)
            .sum()
    }

    fn should_compact(&self, _messages: &[ProviderMessage], _limit: usize) -> bool {
        false
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        messages
    }
}

/// Sliding-window context strategy.
///
/// When context exceeds the limit, drops the oldest messages while
/// keeping the first message (typically the initial user turn) and as
/// many of the most recent messages as fit within half the prior token
/// total.
pub struct SlidingWindow {
    chars_per_token: usize,
}

impl SlidingWindow {
    /// Create a new sliding-window strategy using the default 4
    /// chars-per-token estimation ratio.
    pub fn new() -> Self {
        Self { chars_per_token: 4 }
    }

    /// Create a sliding-window strategy with a custom chars-per-token
    /// ratio.
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    fn estimate_message_tokens(&self, msg: &ProviderMessage) -> usize {
        msg.content
            .iter()
            .map(|part| estimate_part_chars(part) / self.chars_per_token)
            .sum::<usize>()
            + 4 // per-message overhead: role + formatting
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStrategy for SlidingWindow {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message_tokens(m))
            .sum()
    }

    fn should_compact(&self, messages: &[ProviderMessage], limit: usize) -> bool {
        self.token_estimate(messages) > limit
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        if messages.len() <= 2 {
            return messages;
        }

        let first = messages[0].clone();
        let rest = &messages[1..];

        let total_tokens: usize = messages.iter().map(|m| self.estimate_message_tokens(m)).sum();
        let target = total_tokens / 2;

        let mut kept = Vec::new();
        let mut current_tokens = self.estimate_message_tokens(&first);

        for msg in rest.iter().rev() {
            let msg_tokens = self.estimate_message_tokens(msg);
            if current_tokens + msg_tokens > target && !kept.is_empty() {
                break;
            }
            kept.push(msg.clone());
            current_tokens += msg_tokens;
        }

        kept.reverse();
        let mut result = vec![first];
        result.extend(kept);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_provider::Role;

    fn text_message(role: Role, text: &str) -> ProviderMessage {
        ProviderMessage {
            role,
            content: vec![ContentPart::Text {
                text: text.to_string(),
            }],
        }
    }

    #[test]
    fn no_compaction_never_compacts() {
        let strategy = NoCompaction;
        let messages = vec![text_message(Role::User, "hello")];
        assert!(!strategy.should_compact(&messages, 1));
        assert_eq!(strategy.compact(messages.clone()).len(), messages.len());
    }

    #[test]
    fn sliding_window_estimates_tokens() {
        let sw = SlidingWindow::new();
        let messages = vec![text_message(Role::User, &"a".repeat(400))];
        assert_eq!(sw.token_estimate(&messages), 104);
    }

    #[test]
    fn sliding_window_should_compact() {
        let sw = SlidingWindow::new();
        let messages = vec![text_message(Role::User, &"a".repeat(400))];
        assert!(sw.should_compact(&messages, 50));
        assert!(!sw.should_compact(&messages, 200));
    }

    #[test]
    fn sliding_window_compact_preserves_first_and_recent() {
        let sw = SlidingWindow::new();
        let messages = vec![
            text_message(Role::User, &"first ".repeat(100)),
            text_message(Role::Assistant, &"old ".repeat(100)),
            text_message(Role::User, &"middle ".repeat(100)),
            text_message(Role::Assistant, &"recent ".repeat(100)),
            text_message(Role::User, &"latest ".repeat(100)),
        ];

        let compacted = sw.compact(messages.clone());

        assert_eq!(compacted[0].role, Role::User);
        assert_eq!(compacted[0].content[0], messages[0].content[0]);
        assert!(compacted.len() < messages.len());
        assert!(compacted.len() >= 2);
        assert_eq!(
            compacted.last().unwrap().content[0],
            messages.last().unwrap().content[0]
        );
    }

    #[test]
    fn sliding_window_short_messages_unchanged() {
        let sw = SlidingWindow::new();
        let messages = vec![
            text_message(Role::User, "hi"),
            text_message(Role::Assistant, "hello"),
        ];
        let compacted = sw.compact(messages.clone());
        assert_eq!(compacted.len(), messages.len());
    }
}

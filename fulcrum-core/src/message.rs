//! Messages and the source tags that drive LLM-visibility filtering.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// A system-authored message (prompts, corrections, reminders).
    System,
    /// A user-authored message.
    User,
    /// A model-authored reply.
    Assistant,
    /// A tool result folded back into the log.
    Tool,
}

/// Where a message came from. This, not [`MessageRole`], determines
/// whether a message is visible to the LLM request (§3, §4.5 Think).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageSource {
    /// The system prompt assembled at `prepare`.
    SystemPrompt,
    /// Text the end user typed for this run.
    UserInput,
    /// A message replayed from prior session history.
    UserHistory,
    /// A reply emitted by the model.
    AssistantReply,
    /// A tool result folded back into the log.
    ToolResult,
    /// A message injected outside the user's direct turn (memory
    /// refresh, pre-task proactive hooks).
    Proactive,
    /// Diagnostic scratch content, excluded from LLM requests.
    Debug,
    /// Content used only for offline evaluation, excluded from LLM
    /// requests.
    Evaluation,
}

impl MessageSource {
    /// Whether a message with this source is sent to the LLM. `think`
    /// excludes `debug` and `evaluation` sources (§4.5).
    pub fn is_llm_visible(&self) -> bool {
        !matches!(self, MessageSource::Debug | MessageSource::Evaluation)
    }
}

/// A single call the model asked to make.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Model-assigned call identifier, echoed back in the tool result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments, already parsed from the model's function-call
    /// payload (the function-call parser itself is out of scope, §1).
    pub input: serde_json::Value,
}

/// The result of executing a [`ToolCall`], folded back into the
/// message log by `observe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPayload {
    /// ID of the [`ToolCall`] this result answers.
    pub tool_call_id: String,
    /// Rendered tool output.
    pub content: String,
    /// Whether the tool call failed.
    pub is_error: bool,
}

/// One entry in a `TaskState`'s message log.
///
/// Messages are append-only within a run; nothing ever mutates or
/// removes an entry once appended (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Attribution.
    pub role: MessageRole,
    /// Rendered text content.
    pub content: String,
    /// Tool calls the model requested, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// A tool result, if this message carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultPayload>,
    /// Why this message exists; drives LLM-visibility filtering.
    pub source: MessageSource,
    /// Attachment placeholder names referenced by this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Free-form metadata (e.g. `important_notes`, `plan` tool output).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Construct a message with no tool calls, no tool result, no
    /// attachments, and no metadata.
    pub fn new(role: MessageRole, content: impl Into<String>, source: MessageSource) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_result: None,
            source,
            attachments: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Whether this message's content, tool calls, or tool result are
    /// all empty — the Think phase only stores a reply that is
    /// non-empty in at least one of these (§4.5).
    pub fn is_empty_reply(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty() && self.tool_result.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_evaluation_are_not_llm_visible() {
        assert!(!MessageSource::Debug.is_llm_visible());
        assert!(!MessageSource::Evaluation.is_llm_visible());
        assert!(MessageSource::UserInput.is_llm_visible());
        assert!(MessageSource::ToolResult.is_llm_visible());
    }

    #[test]
    fn empty_reply_detection() {
        let m = Message::new(MessageRole::Assistant, "  ", MessageSource::AssistantReply);
        assert!(m.is_empty_reply());
        let m2 = Message::new(MessageRole::Assistant, "hi", MessageSource::AssistantReply);
        assert!(!m2.is_empty_reply());
    }

    #[test]
    fn source_is_kebab_case_on_wire() {
        let json = serde_json::to_string(&MessageSource::UserInput).unwrap();
        assert_eq!(json, "\"user-input\"");
    }
}

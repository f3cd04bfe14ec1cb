//! `TaskState`: the single-owner, run-scoped mutable state the ReAct
//! runtime drives from `prepare` through `finish` (§3, §5).

use crate::attachment::Attachment;
use crate::message::Message;
use fulcrum_proto::{RunId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Maximum depth of the feedback-signal queue (§3, §4.5 Observe).
pub const FEEDBACK_SIGNAL_QUEUE_CAPACITY: usize = 20;

/// A stable-ID note surfaced by a tool's `important_notes` metadata
/// and merged into `TaskState::important_notes` (§4.5 Execute).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportantNote {
    /// Stable ID, assigned at first merge if the tool didn't supply one.
    pub id: String,
    /// Note text.
    pub text: String,
    /// Iteration the note was first recorded at.
    pub iteration: u32,
}

/// A planning artifact recorded by the `plan` tool. Kept as an opaque
/// JSON document since the plan tool's schema is part of the tool
/// registry, which is out of scope (§1) — the gate logic in
/// `fulcrum-react` only needs `complexity` out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Iteration the plan was declared at.
    pub iteration: u32,
    /// Raw plan document as returned by the `plan` tool.
    pub document: serde_json::Value,
}

/// One durable belief recorded over the course of a run. Kept
/// deliberately unopinionated about structure — it's attached
/// verbatim to the world-state map for tools to read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefEntry {
    /// Iteration the belief was recorded at.
    pub iteration: u32,
    /// Belief content.
    pub statement: serde_json::Value,
}

/// One entry in the bounded feedback-signal queue (§3, §4.5 Observe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSignal {
    /// Iteration the signal was recorded at.
    pub iteration: u32,
    /// Name of the tool the signal came from.
    pub tool_name: String,
    /// Signal payload — a short summary of the tool result.
    pub summary: String,
}

/// One entry in the tool-result log (§3, §4.5 Observe). Argument
/// history is compacted in place once it crosses the inline-payload
/// threshold (`fulcrum-react`'s compaction pass).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// Iteration this result belongs to.
    pub iteration: u32,
    /// Tool name.
    pub tool_name: String,
    /// Arguments as invoked (possibly compacted).
    pub arguments: serde_json::Value,
    /// Rendered output.
    pub output: String,
    /// Whether the call errored.
    pub is_error: bool,
}

/// Run-scoped, single-owner mutable state (§3). Created by the
/// coordinator before `prepare`; mutated only by the ReAct runtime that
/// owns it; handed back as a snapshot inside `TaskResult` on
/// completion (§5 Shared-resource policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// Session this run belongs to.
    pub session_id: SessionId,
    /// This run's own ID.
    pub run_id: RunId,
    /// The run that spawned this one, if any (background dispatch).
    pub parent_run_id: Option<RunId>,
    /// Append-only message log.
    pub messages: Vec<Message>,
    /// Number of completed iterations.
    pub iteration: u32,
    /// Rolling token estimate for the current message log.
    pub token_estimate: u64,
    /// Log of every tool result observed so far, in iteration order.
    pub tool_results: Vec<ToolResultRecord>,
    /// Final-answer text, set once `finish` derives it.
    pub final_answer: Option<String>,
    /// Attachments keyed by placeholder.
    pub attachments: HashMap<String, Attachment>,
    /// Iteration each attachment was first registered at.
    pub attachment_origin_iteration: HashMap<String, u32>,
    /// Uploads pending association with the run, keyed by a
    /// caller-chosen bucket ID.
    pub pending_user_uploads: Vec<Attachment>,
    /// Stable-ID notes surfaced by tools.
    pub important_notes: HashMap<String, ImportantNote>,
    /// Plans declared by the `plan` tool, in declaration order.
    pub plans: Vec<PlanEntry>,
    /// Beliefs recorded over the run.
    pub beliefs: Vec<BeliefEntry>,
    /// Free-form references into external knowledge services.
    pub knowledge_references: Vec<String>,
    /// Opaque world-state map, free for tools and the runtime to shape.
    pub world_state: serde_json::Value,
    /// The most recent diff applied to `world_state`.
    pub world_state_diff: Option<serde_json::Value>,
    /// Bounded queue of the most recent tool-result feedback signals.
    pub feedback_signals: VecDeque<FeedbackSignal>,
    /// Most recently rendered goal-reminder prompt, if any.
    pub goal_reminder: Option<String>,
    /// Most recently rendered plan-reminder prompt, if any.
    pub plan_reminder: Option<String>,
}

impl TaskState {
    /// Create an empty state for a fresh run.
    pub fn new(session_id: SessionId, run_id: RunId, parent_run_id: Option<RunId>) -> Self {
        Self {
            session_id,
            run_id,
            parent_run_id,
            messages: Vec::new(),
            iteration: 0,
            token_estimate: 0,
            tool_results: Vec::new(),
            final_answer: None,
            attachments: HashMap::new(),
            attachment_origin_iteration: HashMap::new(),
            pending_user_uploads: Vec::new(),
            important_notes: HashMap::new(),
            plans: Vec::new(),
            beliefs: Vec::new(),
            knowledge_references: Vec::new(),
            world_state: serde_json::json!({}),
            world_state_diff: None,
            feedback_signals: VecDeque::new(),
            goal_reminder: None,
            plan_reminder: None,
        }
    }

    /// Register an attachment, enforcing the re-registration invariant:
    /// a placeholder already present in the table may only be
    /// re-registered with a value-equal attachment. Returns `false` if
    /// the registration was rejected as a conflicting duplicate.
    pub fn register_attachment(&mut self, attachment: Attachment, iteration: u32) -> bool {
        if let Some(existing) = self.attachments.get(&attachment.placeholder) {
            if !existing.value_equal(&attachment) {
                return false;
            }
            return true;
        }
        self.attachment_origin_iteration
            .insert(attachment.placeholder.clone(), iteration);
        self.attachments.insert(attachment.placeholder.clone(), attachment);
        true
    }

    /// Push a feedback signal, dropping the oldest entry once the
    /// bounded capacity is exceeded (§3, §4.5 Observe).
    pub fn push_feedback_signal(&mut self, signal: FeedbackSignal) {
        if self.feedback_signals.len() >= FEEDBACK_SIGNAL_QUEUE_CAPACITY {
            self.feedback_signals.pop_front();
        }
        self.feedback_signals.push_back(signal);
    }

    /// The most recent plan declared, if any.
    pub fn latest_plan(&self) -> Option<&PlanEntry> {
        self.plans.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentSource;

    fn state() -> TaskState {
        TaskState::new(SessionId::new("s-1"), RunId::new("r-1"), None)
    }

    fn attachment(placeholder: &str) -> Attachment {
        Attachment {
            placeholder: placeholder.into(),
            display_name: placeholder.into(),
            media_type: "image/png".into(),
            inline_data: Some("QUJD".into()),
            uri: None,
            description: None,
            source: AttachmentSource::UserUpload,
        }
    }

    #[test]
    fn attachment_registration_is_idempotent_when_value_equal() {
        let mut state = state();
        assert!(state.register_attachment(attachment("image_1"), 1));
        assert!(state.register_attachment(attachment("image_1"), 2));
        assert_eq!(state.attachment_origin_iteration["image_1"], 1);
    }

    #[test]
    fn conflicting_reregistration_is_rejected() {
        let mut state = state();
        assert!(state.register_attachment(attachment("image_1"), 1));
        let mut conflicting = attachment("image_1");
        conflicting.display_name = "different.png".into();
        assert!(!state.register_attachment(conflicting, 2));
    }

    #[test]
    fn feedback_signal_queue_is_bounded() {
        let mut state = state();
        for i in 0..30 {
            state.push_feedback_signal(FeedbackSignal {
                iteration: i,
                tool_name: "t".into(),
                summary: "s".into(),
            });
        }
        assert_eq!(state.feedback_signals.len(), FEEDBACK_SIGNAL_QUEUE_CAPACITY);
        assert_eq!(state.feedback_signals.front().unwrap().iteration, 10);
    }
}

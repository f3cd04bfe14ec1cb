//! `TaskResult` — the snapshot handed back to the caller of
//! `ExecuteTask` on every normal return (§3, §7).

use crate::attachment::Attachment;
use crate::message::Message;
use crate::task_state::ImportantNote;
use crate::workflow::WorkflowSnapshot;
use fulcrum_proto::{DurationMs, RunId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a run's ReAct loop stopped (§3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `finish` derived a non-empty answer with no pending tool calls.
    FinalAnswer,
    /// The configured iteration cap was reached.
    MaxIterations,
    /// The run's cancellation token fired.
    Cancelled,
    /// A `think` call failed fatally.
    Error,
    /// A plan review pause or `request_user` gate suspended the run
    /// pending caller input.
    AwaitUserInput,
}

/// Final snapshot of one `ExecuteTask` invocation (§3).
///
/// The coordinator always returns one of these on a normal return
/// (§7), even when `final_answer` is empty and `stop_reason` isn't
/// `final_answer` — callers must not assume a non-final stop reason
/// means the result is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Final answer text, empty if the run didn't reach one.
    pub final_answer: String,
    /// The full message log as of completion.
    pub messages: Vec<Message>,
    /// Number of completed iterations.
    pub iterations: u32,
    /// Token usage: `(input_tokens, output_tokens)`.
    pub token_usage: (u64, u64),
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// The session this run belongs to.
    pub session_id: SessionId,
    /// This run's own ID.
    pub run_id: RunId,
    /// The run that spawned this one, if any.
    pub parent_run_id: Option<RunId>,
    /// Attachments registered over the run.
    pub attachments: HashMap<String, Attachment>,
    /// Wall-clock duration of the run.
    pub duration: DurationMs,
    /// Stable-ID notes surfaced by tools over the run.
    pub important_notes: HashMap<String, ImportantNote>,
    /// The run's workflow graph at completion.
    pub workflow: WorkflowSnapshot,
}

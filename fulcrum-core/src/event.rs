//! The domain event model (§3, §9).
//!
//! Per the Design Note in `spec.md` §9 ("model this as a tagged variant
//! ... not as deep inheritance"), every event is a small shared
//! [`EventHeader`] plus an [`EventBody`] tagged enum with one variant
//! per specialization. `fulcrum-events` is the `match`-on-tag
//! translator that turns these into wire [`EventEnvelope`](../fulcrum_events/struct.EventEnvelope.html)s;
//! this crate only owns the shape.

use crate::workflow::WorkflowSnapshot;
use fulcrum_proto::{BackgroundTaskId, CausationId, CorrelationId, EventId, RunId, SessionId};
use serde::{Deserialize, Serialize};

/// Which tier of the agent hierarchy emitted an event (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLevel {
    /// The root-level run driving the user's task directly.
    Core,
    /// A run dispatched as a background sub-task of another run.
    Subagent,
    /// One of several sibling runs executing concurrently under a
    /// fan-out (parallel tool execution or parallel background runs).
    Parallel,
}

/// Fields present on every event, regardless of specialization (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    /// Tier of the agent hierarchy this event came from.
    pub agent_level: AgentLevel,
    /// Session the emitting run belongs to.
    pub session_id: SessionId,
    /// The run that emitted this event.
    pub run_id: RunId,
    /// The run that spawned the emitting run, if any.
    pub parent_run_id: Option<RunId>,
    /// Root of this event's causal chain — the same value across every
    /// event produced by a run and its descendants.
    pub correlation_id: CorrelationId,
    /// Immediate causal parent: the event (or run) that produced this one.
    pub causation_id: CausationId,
    /// Unique identifier for this event.
    pub event_id: EventId,
    /// Monotonic, per-run sequence number. Never reused within a run.
    pub seq: u64,
    /// Wall-clock time the event was produced.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// One specialization of a domain event, carrying only the payload
/// specific to that shape. The shared [`EventHeader`] lives alongside
/// it on [`Event`], not duplicated per variant.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    /// A workflow node transitioned; carries a full, sanitized snapshot.
    LifecycleUpdated {
        /// The graph as of this transition.
        snapshot: WorkflowSnapshot,
    },
    /// A node began running.
    NodeStarted {
        /// Node ID, per the grammar in §6.
        node_id: String,
        /// Input payload, if supplied.
        input: Option<serde_json::Value>,
    },
    /// A node completed without error.
    NodeSucceeded {
        /// Node ID.
        node_id: String,
        /// Output payload, if any.
        output: Option<serde_json::Value>,
    },
    /// A node completed with an error.
    NodeFailed {
        /// Node ID.
        node_id: String,
        /// Error text.
        error: String,
    },
    /// A coarse, non-streaming summary of a node's output.
    NodeOutputSummary {
        /// Node ID.
        node_id: String,
        /// Summary text.
        summary: String,
    },
    /// One chunk of a node's streaming output.
    NodeOutputDelta {
        /// Node ID.
        node_id: String,
        /// This chunk's content.
        delta: String,
        /// Whether this is the terminal chunk for the node's stream.
        is_final: bool,
    },
    /// A tool call began executing.
    ToolStarted {
        /// The aggregate iteration node this tool runs under.
        node_id: String,
        /// Tool name.
        tool_name: String,
        /// Arguments passed to the tool.
        input: serde_json::Value,
    },
    /// A tool call reported interim progress.
    ToolProgress {
        /// Node ID.
        node_id: String,
        /// Tool name.
        tool_name: String,
        /// Progress payload, tool-defined.
        progress: serde_json::Value,
    },
    /// A tool call finished.
    ToolCompleted {
        /// Node ID.
        node_id: String,
        /// Tool name.
        tool_name: String,
        /// Rendered output.
        output: String,
        /// Whether the call errored.
        is_error: bool,
    },
    /// One chunk of the final answer, or the terminal chunk.
    ResultFinal {
        /// Chunk content (or the full remaining tail on the terminal event).
        content: String,
        /// Whether this is the terminal `result.final` event for the run.
        stream_finished: bool,
    },
    /// The run was cancelled.
    ResultCancelled {
        /// Reason for cancellation, if known.
        reason: Option<String>,
    },
    /// Free-form diagnostic information, not part of the wire
    /// envelope's closed event vocabulary beyond the `diagnostic.*`
    /// namespace.
    Diagnostic {
        /// Sub-label under the `diagnostic.*` namespace.
        label: String,
        /// Diagnostic payload.
        data: serde_json::Value,
    },
    /// A tool dispatched a detached background task.
    BackgroundTaskDispatched {
        /// The dispatched task's ID.
        task_id: BackgroundTaskId,
        /// The task's description.
        description: String,
    },
    /// A background task reached a terminal state and was drained.
    BackgroundTaskCompleted {
        /// The task's ID.
        task_id: BackgroundTaskId,
        /// Whether it completed successfully.
        success: bool,
        /// Short summary of the outcome.
        summary: String,
    },
    /// Progress reported by an external-agent executor.
    ExternalAgentProgress {
        /// The executor key that reported progress.
        executor: String,
        /// Progress payload, executor-defined.
        data: serde_json::Value,
    },
    /// User input was received and folded into the message log.
    InputReceived {
        /// The input content.
        content: String,
    },
    /// A memory-refresh pass injected proactive context.
    ProactiveContextRefresh {
        /// Keywords the refresh searched for.
        query: String,
        /// Text injected into the message log.
        injected: String,
    },
    /// An inner event produced by a subflow, tagged with the subflow's
    /// parent-run context so consumers can attribute it.
    SubtaskWrapper {
        /// The run ID of the subflow's parent.
        subflow_parent_run_id: RunId,
        /// The wrapped event.
        inner: Box<Event>,
    },
}

/// One domain event: a shared header plus a tagged body (§3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Fields common to every event.
    pub header: EventHeader,
    /// The event-specific payload.
    pub body: EventBody,
}

impl Event {
    /// Construct an event from a header and body.
    pub fn new(header: EventHeader, body: EventBody) -> Self {
        Self { header, body }
    }

    /// Whether this event is one of the two terminal shapes a run may
    /// emit exactly once (§8): a stream-finished `ResultFinal` or a
    /// `ResultCancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            &self.body,
            EventBody::ResultCancelled { .. }
                | EventBody::ResultFinal {
                    stream_finished: true,
                    ..
                }
        )
    }
}

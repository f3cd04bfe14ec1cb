//! The canonical wire envelope (§4.2, §6) every outbound event is
//! translated into before it reaches a downstream consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulcrum_core::AgentLevel;
use fulcrum_proto::{CausationId, CorrelationId, EventId, RunId, SessionId, WorkflowId};

/// The coarse shape of whatever an envelope's `node_id` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A coordinator or runtime workflow node with no more specific kind.
    Node,
    /// A fine-grained tool-progress step.
    Step,
    /// A ReAct iteration.
    Iteration,
    /// A tool invocation.
    Tool,
    /// Model output (think-phase text/thinking deltas and summaries).
    Generation,
    /// Free-form diagnostic information.
    Diagnostic,
    /// A terminal or interim result.
    Result,
    /// User or system input folded into the message log.
    Input,
    /// A synthesized artifact manifest.
    Artifact,
    /// A subflow progress or completion rollup.
    Subflow,
    /// A background task lifecycle event.
    Background,
    /// Progress reported by an external-agent executor.
    ExternalAgent,
}

/// The canonical envelope every outbound event is translated into
/// (§4.2, §6). `event` is drawn from the closed wire vocabulary (e.g.
/// `workflow.lifecycle.updated`); everything specific to the event
/// shape lives in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Closed-vocabulary event name, e.g. `workflow.node.started`.
    pub event: String,
    /// Coarse shape of `node_id`.
    pub node_kind: NodeKind,
    /// The node this event concerns, if any.
    pub node_id: Option<String>,
    /// The workflow this event belongs to, propagated from the last
    /// seen `LifecycleUpdated` snapshot when the source event carries
    /// none of its own (§4.2 "context propagation").
    pub workflow_id: Option<WorkflowId>,
    /// The run that produced this event.
    pub run_id: RunId,
    /// The session the run belongs to.
    pub session_id: SessionId,
    /// Tier of the agent hierarchy this event came from.
    pub agent_level: AgentLevel,
    /// Monotonic per-run sequence number, carried from the source event.
    pub seq: u64,
    /// Unique ID of the source event.
    pub event_id: EventId,
    /// Root of this event's causal chain.
    pub correlation_id: CorrelationId,
    /// Immediate causal parent of the source event.
    pub causation_id: CausationId,
    /// Wall-clock time the source event was produced, RFC-3339 on the wire.
    pub timestamp: DateTime<Utc>,
    /// Event-shape-specific payload.
    pub payload: serde_json::Value,
}

//! Workflow graph data types (§3). Behavior — the tracker that mutates
//! these under a lock and emits lifecycle events on transition — lives
//! in `fulcrum-workflow`; this module only defines the shapes.

use fulcrum_proto::{DurationMs, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of one workflow node. Transitions are monotonic within
/// `pending -> running -> {succeeded, failed}`; a node never leaves a
/// terminal state (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Registered but not yet started.
    Pending,
    /// Started, not yet terminal.
    Running,
    /// Completed without error.
    Succeeded,
    /// Completed with an error.
    Failed,
}

impl NodeStatus {
    /// Whether this status is terminal (`succeeded` or `failed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed)
    }
}

/// One node in a run's workflow graph (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Stable string identifier, per the node ID grammar (§6).
    pub id: String,
    /// Current status.
    pub status: NodeStatus,
    /// Input payload, if the caller supplied one at `ensure_node`.
    pub input: Option<serde_json::Value>,
    /// Output payload, set on `complete_success`.
    pub output: Option<serde_json::Value>,
    /// Error string, set on `complete_failure`.
    pub error: Option<String>,
    /// Wall-clock start time, set on `start_node`.
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Wall-clock end time, set on `complete_success`/`complete_failure`.
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WorkflowNode {
    /// A freshly `ensure_node`-registered node: pending, no timestamps.
    pub fn pending(id: impl Into<String>, input: Option<serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            status: NodeStatus::Pending,
            input,
            output: None,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Overall phase of a run's workflow, derived from its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// No node has started yet.
    Initial,
    /// At least one node is running or pending.
    Running,
    /// Every node reached a terminal state and none failed.
    Succeeded,
    /// Every node reached a terminal state and at least one failed.
    Failed,
}

/// A deep, point-in-time copy of a run's workflow graph (§3, §4.1
/// `snapshot()`). Invariant: every ID in `order` has exactly one entry
/// in `nodes`; a snapshot taken after the workflow reaches a terminal
/// phase is frozen and will not change underneath the holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Workflow identifier.
    pub workflow_id: WorkflowId,
    /// Current phase.
    pub phase: WorkflowPhase,
    /// Node IDs in insertion (first-seen) order.
    pub order: Vec<String>,
    /// Node snapshots keyed by ID.
    pub nodes: HashMap<String, WorkflowNode>,
    /// Wall-clock start time of the workflow.
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Wall-clock end time of the workflow, set once `phase` is terminal.
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Total duration once terminal.
    pub duration: Option<DurationMs>,
    /// Count of nodes per status, recomputed on every snapshot.
    pub status_histogram: HashMap<NodeStatus, u32>,
}

impl WorkflowSnapshot {
    /// An empty snapshot for a freshly created workflow.
    pub fn empty(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            phase: WorkflowPhase::Initial,
            order: Vec::new(),
            nodes: HashMap::new(),
            started_at: None,
            ended_at: None,
            duration: None,
            status_histogram: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(NodeStatus::Succeeded.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(!NodeStatus::Pending.is_terminal());
    }

    #[test]
    fn empty_snapshot_has_no_nodes_and_initial_phase() {
        let snap = WorkflowSnapshot::empty(WorkflowId::new("wf-1"));
        assert_eq!(snap.phase, WorkflowPhase::Initial);
        assert!(snap.order.is_empty());
        assert!(snap.nodes.is_empty());
    }
}

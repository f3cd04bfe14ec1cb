//! The mutable graph a [`crate::LocalWorkflowTracker`] guards behind a
//! single lock (§4.1: "concurrent calls on the same ID are serialized
//! under a per-tracker lock").

use std::collections::HashMap;

use chrono::Utc;
use fulcrum_core::{NodeStatus, WorkflowNode, WorkflowPhase, WorkflowSnapshot};
use fulcrum_proto::{DurationMs, WorkflowId};

pub(crate) struct WorkflowGraph {
    workflow_id: WorkflowId,
    order: Vec<String>,
    nodes: HashMap<String, WorkflowNode>,
    started_at: Option<chrono::DateTime<Utc>>,
    ended_at: Option<chrono::DateTime<Utc>>,
}

impl WorkflowGraph {
    pub(crate) fn new(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            order: Vec::new(),
            nodes: HashMap::new(),
            started_at: None,
            ended_at: None,
        }
    }

    fn ensure(&mut self, id: &str, input: Option<serde_json::Value>) -> bool {
        if self.nodes.contains_key(id) {
            return false;
        }
        self.order.push(id.to_string());
        self.nodes
            .insert(id.to_string(), WorkflowNode::pending(id, input));
        true
    }

    /// `ensure_node`: idempotent, registers a pending node in insertion
    /// order if absent. Returns `true` if a new node was created.
    pub(crate) fn ensure_node(&mut self, id: &str, input: Option<serde_json::Value>) -> bool {
        self.ensure(id, input)
    }

    /// `start_node`: pending -> running. Lazily creates the node if
    /// unknown, per §4.1.
    pub(crate) fn start_node(&mut self, id: &str) {
        self.ensure(id, None);
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if let Some(node) = self.nodes.get_mut(id) {
            if node.status == NodeStatus::Pending {
                node.status = NodeStatus::Running;
                node.started_at = Some(Utc::now());
            }
        }
    }

    /// `complete_success`: running -> succeeded. A terminal node is left
    /// untouched (terminal states never regress, §4.1).
    pub(crate) fn complete_success(&mut self, id: &str, output: Option<serde_json::Value>) {
        self.ensure(id, None);
        if let Some(node) = self.nodes.get_mut(id) {
            if !node.status.is_terminal() {
                node.status = NodeStatus::Succeeded;
                node.output = output;
                node.ended_at = Some(Utc::now());
            }
        }
    }

    /// `complete_failure`: running -> failed.
    pub(crate) fn complete_failure(&mut self, id: &str, error: String) {
        self.ensure(id, None);
        if let Some(node) = self.nodes.get_mut(id) {
            if !node.status.is_terminal() {
                node.status = NodeStatus::Failed;
                node.error = Some(error);
                node.ended_at = Some(Utc::now());
            }
        }
    }

    fn phase(&self) -> WorkflowPhase {
        if self.nodes.is_empty() {
            return WorkflowPhase::Initial;
        }
        let mut any_failed = false;
        for node in self.nodes.values() {
            if !node.status.is_terminal() {
                return WorkflowPhase::Running;
            }
            if node.status == NodeStatus::Failed {
                any_failed = true;
            }
        }
        if any_failed {
            WorkflowPhase::Failed
        } else {
            WorkflowPhase::Succeeded
        }
    }

    /// `snapshot`: a deep, point-in-time copy (§4.1).
    pub(crate) fn snapshot(&mut self) -> WorkflowSnapshot {
        let phase = self.phase();
        if phase != WorkflowPhase::Initial && phase != WorkflowPhase::Running && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }

        let mut histogram = HashMap::new();
        for node in self.nodes.values() {
            *histogram.entry(node.status).or_insert(0) += 1;
        }

        let duration = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(DurationMs::from(
                (end - start).to_std().unwrap_or_default(),
            )),
            _ => None,
        };

        WorkflowSnapshot {
            workflow_id: self.workflow_id.clone(),
            phase,
            order: self.order.clone(),
            nodes: self.nodes.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration,
            status_histogram: histogram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_node_is_idempotent_and_preserves_order() {
        let mut graph = WorkflowGraph::new(WorkflowId::new("wf-1"));
        assert!(graph.ensure_node("a", None));
        assert!(!graph.ensure_node("a", None));
        assert!(graph.ensure_node("b", None));

        let snap = graph.snapshot();
        assert_eq!(snap.order, vec!["a", "b"]);
    }

    #[test]
    fn transitions_are_monotonic_and_terminal_locks() {
        let mut graph = WorkflowGraph::new(WorkflowId::new("wf-1"));
        graph.start_node("a");
        graph.complete_success("a", None);
        // A second completion attempt (e.g. a late failure report) must
        // not regress the terminal state.
        graph.complete_failure("a", "late error".into());

        let snap = graph.snapshot();
        assert_eq!(snap.nodes["a"].status, NodeStatus::Succeeded);
        assert!(snap.nodes["a"].error.is_none());
    }

    #[test]
    fn phase_succeeded_when_all_nodes_succeed() {
        let mut graph = WorkflowGraph::new(WorkflowId::new("wf-1"));
        graph.start_node("a");
        graph.complete_success("a", None);
        assert_eq!(graph.snapshot().phase, WorkflowPhase::Succeeded);
    }

    #[test]
    fn phase_failed_when_any_node_fails() {
        let mut graph = WorkflowGraph::new(WorkflowId::new("wf-1"));
        graph.start_node("a");
        graph.complete_success("a", None);
        graph.start_node("b");
        graph.complete_failure("b", "boom".into());
        assert_eq!(graph.snapshot().phase, WorkflowPhase::Failed);
    }

    #[test]
    fn unknown_id_operations_create_lazily() {
        let mut graph = WorkflowGraph::new(WorkflowId::new("wf-1"));
        graph.complete_success("never-started", None);
        let snap = graph.snapshot();
        assert_eq!(snap.nodes["never-started"].status, NodeStatus::Succeeded);
    }
}

//! The [`WorkflowTracker`] trait and its in-process implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use fulcrum_core::{AgentLevel, Event, EventBody, EventHeader, WorkflowSnapshot};
use fulcrum_proto::{CausationId, CorrelationId, EventId, RunId, SessionId, WorkflowId};

use crate::graph::WorkflowGraph;

/// Capability interface the ReAct runtime and coordinator hold the
/// tracker by. Per the Design Note in spec §9, this is the *only* way
/// the engine touches the tracker — there is no back-pointer from the
/// tracker into the engine, only this narrow four-method-plus-snapshot
/// surface.
#[async_trait]
pub trait WorkflowTracker: Send + Sync {
    /// Register a pending node in insertion order if absent. Idempotent.
    async fn ensure_node(&self, id: &str, input: Option<serde_json::Value>);

    /// Transition `pending -> running`, stamping the start time.
    async fn start_node(&self, id: &str);

    /// Transition `running -> succeeded`, capturing the output.
    async fn complete_success(&self, id: &str, output: Option<serde_json::Value>);

    /// Transition `running -> failed`, capturing the error.
    async fn complete_failure(&self, id: &str, error: String);

    /// A deep, point-in-time copy of the current graph.
    async fn snapshot(&self) -> WorkflowSnapshot;
}

/// Fixed per-run identity a [`LocalWorkflowTracker`] stamps onto every
/// lifecycle event it emits. One tracker is constructed per run (§4.6
/// step 6), so this is set once at construction, not threaded through
/// every call.
#[derive(Debug, Clone)]
pub struct TrackerIdentity {
    /// Tier of the agent hierarchy this run belongs to.
    pub agent_level: AgentLevel,
    /// Session the run belongs to.
    pub session_id: SessionId,
    /// This run's ID.
    pub run_id: RunId,
    /// The run that spawned this one, if any.
    pub parent_run_id: Option<RunId>,
    /// Root of this run's causal chain.
    pub correlation_id: CorrelationId,
    /// Immediate causal parent of this run.
    pub causation_id: CausationId,
}

/// The default [`WorkflowTracker`]: an `Arc<Mutex<WorkflowGraph>>` that
/// emits one lifecycle event per transition into an injected sink.
///
/// The sink is a plain channel sender, not the engine itself — the
/// tracker never holds a reference back into whatever consumes its
/// events (§9).
pub struct LocalWorkflowTracker {
    identity: TrackerIdentity,
    graph: Mutex<WorkflowGraph>,
    seq: AtomicU64,
    sink: mpsc::UnboundedSender<Event>,
}

impl LocalWorkflowTracker {
    /// Build a tracker for one run, emitting lifecycle events into
    /// `sink`. A closed sink is tolerated — sends are best-effort, since
    /// losing the event channel must never fail the run itself.
    pub fn new(
        workflow_id: WorkflowId,
        identity: TrackerIdentity,
        sink: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            identity,
            graph: Mutex::new(WorkflowGraph::new(workflow_id)),
            seq: AtomicU64::new(0),
            sink,
        }
    }

    fn header(&self) -> EventHeader {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        EventHeader {
            agent_level: self.identity.agent_level,
            session_id: self.identity.session_id.clone(),
            run_id: self.identity.run_id.clone(),
            parent_run_id: self.identity.parent_run_id.clone(),
            correlation_id: self.identity.correlation_id.clone(),
            causation_id: self.identity.causation_id.clone(),
            event_id: EventId::new(format!("{}:{}", self.identity.run_id, seq)),
            seq,
            timestamp: Utc::now(),
        }
    }

    fn emit(&self, body: EventBody) {
        let event = Event::new(self.header(), body);
        // Best-effort: a dropped receiver means the router/translator
        // already retired this run's queue; the tracker itself never
        // fails because of it.
        let _ = self.sink.send(event);
    }
}

#[async_trait]
impl WorkflowTracker for LocalWorkflowTracker {
    async fn ensure_node(&self, id: &str, input: Option<serde_json::Value>) {
        let created = {
            let mut graph = self.graph.lock().await;
            graph.ensure_node(id, input)
        };
        if created {
            let snapshot = self.snapshot().await;
            self.emit(EventBody::LifecycleUpdated { snapshot });
        }
    }

    async fn start_node(&self, id: &str) {
        {
            let mut graph = self.graph.lock().await;
            graph.start_node(id);
        }
        self.emit(EventBody::NodeStarted {
            node_id: id.to_string(),
            input: None,
        });
        let snapshot = self.snapshot().await;
        self.emit(EventBody::LifecycleUpdated { snapshot });
    }

    async fn complete_success(&self, id: &str, output: Option<serde_json::Value>) {
        {
            let mut graph = self.graph.lock().await;
            graph.complete_success(id, output.clone());
        }
        self.emit(EventBody::NodeSucceeded {
            node_id: id.to_string(),
            output,
        });
        let snapshot = self.snapshot().await;
        self.emit(EventBody::LifecycleUpdated { snapshot });
    }

    async fn complete_failure(&self, id: &str, error: String) {
        {
            let mut graph = self.graph.lock().await;
            graph.complete_failure(id, error.clone());
        }
        self.emit(EventBody::NodeFailed {
            node_id: id.to_string(),
            error,
        });
        let snapshot = self.snapshot().await;
        self.emit(EventBody::LifecycleUpdated { snapshot });
    }

    async fn snapshot(&self) -> WorkflowSnapshot {
        let mut graph = self.graph.lock().await;
        graph.snapshot()
    }
}

/// Shared-ownership handle, the form every collaborator actually holds.
pub type SharedWorkflowTracker = Arc<dyn WorkflowTracker>;

/// A second, narrower capability onto the same tracker: emitting event
/// bodies that aren't one of the four lifecycle transitions
/// [`WorkflowTracker`] exposes — tool progress, streaming deltas,
/// terminal results, diagnostics (§4.5 Think/Execute/Finish).
///
/// Kept separate from `WorkflowTracker` rather than added as a fifth
/// method on it, since the design note in spec §9 calls out that
/// interface as a deliberately narrow four-method-plus-snapshot
/// surface. A `LocalWorkflowTracker` implements both traits over the
/// same identity, sequence counter, and sink, so events from either
/// path interleave in one strictly-increasing sequence.
#[async_trait]
pub trait WorkflowEventEmitter: Send + Sync {
    /// Stamp `body` with this run's identity and next sequence number
    /// and push it to the sink.
    async fn emit_event(&self, body: EventBody);
}

#[async_trait]
impl WorkflowEventEmitter for LocalWorkflowTracker {
    async fn emit_event(&self, body: EventBody) {
        self.emit(body);
    }
}

/// Shared-ownership handle for the event-emission capability.
pub type SharedWorkflowEmitter = Arc<dyn WorkflowEventEmitter>;

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TrackerIdentity {
        TrackerIdentity {
            agent_level: AgentLevel::Core,
            session_id: SessionId::new("s-1"),
            run_id: RunId::new("r-1"),
            parent_run_id: None,
            correlation_id: CorrelationId::new("r-1"),
            causation_id: CausationId::new("r-1"),
        }
    }

    #[tokio::test]
    async fn start_node_emits_node_started_then_lifecycle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = LocalWorkflowTracker::new(WorkflowId::new("wf-1"), identity(), tx);

        tracker.start_node("react:iter:1:think").await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.body, EventBody::NodeStarted { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.body, EventBody::LifecycleUpdated { .. }));
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = LocalWorkflowTracker::new(WorkflowId::new("wf-1"), identity(), tx);

        tracker.start_node("a").await;
        tracker.complete_success("a", None).await;

        let mut last_seq = None;
        while let Ok(event) = rx.try_recv() {
            if let Some(prev) = last_seq {
                assert!(event.header.seq > prev);
            }
            last_seq = Some(event.header.seq);
        }
        assert!(last_seq.is_some());
    }

    #[tokio::test]
    async fn terminal_state_does_not_regress() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tracker = LocalWorkflowTracker::new(WorkflowId::new("wf-1"), identity(), tx);

        tracker.start_node("a").await;
        tracker.complete_success("a", None).await;
        tracker.complete_failure("a", "late".into()).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(
            snapshot.nodes["a"].status,
            fulcrum_core::NodeStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn dropped_sink_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = LocalWorkflowTracker::new(WorkflowId::new("wf-1"), identity(), tx);
        tracker.start_node("a").await;
        tracker.complete_success("a", None).await;
    }
}

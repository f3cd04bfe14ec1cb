//! The envelope translator (C2): a `match` over the domain [`EventBody`]
//! tagged enum (Design Note §9), not a trait hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use fulcrum_core::{Event, EventBody, NodeStatus, WorkflowSnapshot};
use fulcrum_proto::RunId;

use crate::envelope::{EventEnvelope, NodeKind};
use crate::listener::{EnvelopeListener, EventListener};

/// Per-subflow progress tally (§4.2 "subflow aggregation"), attached to
/// every subflow envelope so the UI sees monotonically improving
/// progress rather than having to reconstruct it client-side.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SubflowTally {
    /// Total sub-runs dispatched under this parent.
    pub total: u32,
    /// Sub-runs that have reached a terminal state.
    pub completed: u32,
    /// Sub-runs that completed successfully.
    pub success: u32,
    /// Sub-runs that failed.
    pub failed: u32,
    /// Tokens consumed across all sub-runs so far (best-effort).
    pub tokens: u64,
    /// Tool calls made across all sub-runs so far.
    pub tool_calls: u32,
}

#[derive(Default)]
struct TranslatorState {
    last_workflow_id: Option<fulcrum_proto::WorkflowId>,
    last_snapshot: Option<WorkflowSnapshot>,
    tallies: HashMap<RunId, SubflowTally>,
}

/// Returns `true` if `id` matches the tool-recorder aggregate pattern
/// `react:iter:{n}:tools` (four colon-separated segments, last one
/// literally `tools`). Child tool nodes (`react:iter:{n}:tool:{name}:{k}`)
/// do not match and are preserved.
fn is_tool_recorder_aggregate(id: &str) -> bool {
    let parts: Vec<&str> = id.split(':').collect();
    parts.len() == 4 && parts[0] == "react" && parts[1] == "iter" && parts[3] == "tools"
}

/// Remove tool-recorder aggregate nodes from a snapshot's node list and
/// order, and recompute the status histogram (§4.2 "snapshot
/// sanitization").
fn sanitize_snapshot(snapshot: &WorkflowSnapshot) -> WorkflowSnapshot {
    let mut sanitized = snapshot.clone();
    sanitized.order.retain(|id| !is_tool_recorder_aggregate(id));
    sanitized
        .nodes
        .retain(|id, _| !is_tool_recorder_aggregate(id));

    let mut histogram = HashMap::new();
    for node in sanitized.nodes.values() {
        *histogram.entry(node.status).or_insert(0) += 1;
    }
    sanitized.status_histogram = histogram;
    sanitized
}

fn node_kind_for_id(id: &str) -> NodeKind {
    if id.starts_with("react:iter:") && id.contains(":tool:") {
        NodeKind::Tool
    } else if id.starts_with("react:iter:") && id.ends_with(":think") {
        NodeKind::Generation
    } else if id.starts_with("iteration-") {
        NodeKind::Iteration
    } else if id.starts_with("subflow-") {
        NodeKind::Subflow
    } else {
        NodeKind::Node
    }
}

/// Translates heterogeneous domain events into the canonical envelope
/// form, forwarding the result(s) to an inner [`EnvelopeListener`].
///
/// Holds per-instance state: the last-seen workflow ID and snapshot
/// (so events that carry neither, like `ToolProgress`, can still be
/// tagged with the run's current workflow identity) and a per-parent-
/// run subflow tally.
pub struct EnvelopeTranslator {
    inner: Arc<dyn EnvelopeListener>,
    state: tokio::sync::Mutex<TranslatorState>,
}

impl EnvelopeTranslator {
    /// Build a translator forwarding envelopes to `inner`.
    pub fn new(inner: Arc<dyn EnvelopeListener>) -> Self {
        Self {
            inner,
            state: tokio::sync::Mutex::new(TranslatorState::default()),
        }
    }

    /// Translate one domain event into zero or more envelopes.
    pub async fn translate(&self, event: &Event) -> Vec<EventEnvelope> {
        let header = &event.header;
        let mut state = self.state.lock().await;

        let base = |event_name: &str, node_kind: NodeKind, node_id: Option<String>, payload: serde_json::Value| {
            EventEnvelope {
                event: event_name.to_string(),
                node_kind,
                node_id,
                workflow_id: state.last_workflow_id.clone(),
                run_id: header.run_id.clone(),
                session_id: header.session_id.clone(),
                agent_level: header.agent_level,
                seq: header.seq,
                event_id: header.event_id.clone(),
                correlation_id: header.correlation_id.clone(),
                causation_id: header.causation_id.clone(),
                timestamp: header.timestamp,
                payload,
            }
        };

        match &event.body {
            EventBody::LifecycleUpdated { snapshot } => {
                let sanitized = sanitize_snapshot(snapshot);
                state.last_workflow_id = Some(sanitized.workflow_id.clone());
                state.last_snapshot = Some(sanitized.clone());
                vec![base(
                    "workflow.lifecycle.updated",
                    NodeKind::Node,
                    None,
                    json!({ "snapshot": sanitized }),
                )]
            }
            EventBody::NodeStarted { node_id, input } => {
                if is_tool_recorder_aggregate(node_id) {
                    return Vec::new();
                }
                vec![base(
                    "workflow.node.started",
                    node_kind_for_id(node_id),
                    Some(node_id.clone()),
                    json!({ "input": input }),
                )]
            }
            EventBody::NodeSucceeded { node_id, output } => {
                if is_tool_recorder_aggregate(node_id) {
                    return Vec::new();
                }
                vec![base(
                    "workflow.node.completed",
                    node_kind_for_id(node_id),
                    Some(node_id.clone()),
                    json!({ "output": output }),
                )]
            }
            EventBody::NodeFailed { node_id, error } => {
                if is_tool_recorder_aggregate(node_id) {
                    return Vec::new();
                }
                vec![base(
                    "workflow.node.failed",
                    node_kind_for_id(node_id),
                    Some(node_id.clone()),
                    json!({ "error": error }),
                )]
            }
            EventBody::NodeOutputSummary { node_id, summary } => vec![base(
                "workflow.node.output.summary",
                NodeKind::Generation,
                Some(node_id.clone()),
                json!({ "summary": summary }),
            )],
            EventBody::NodeOutputDelta {
                node_id,
                delta,
                is_final,
            } => vec![base(
                "workflow.node.output.delta",
                NodeKind::Generation,
                Some(node_id.clone()),
                json!({ "delta": delta, "is_final": is_final }),
            )],
            EventBody::ToolStarted {
                node_id,
                tool_name,
                input,
            } => vec![base(
                "workflow.tool.started",
                NodeKind::Tool,
                Some(node_id.clone()),
                json!({ "tool_name": tool_name, "input": input }),
            )],
            EventBody::ToolProgress {
                node_id,
                tool_name,
                progress,
            } => vec![base(
                "workflow.tool.progress",
                NodeKind::Tool,
                Some(node_id.clone()),
                json!({ "tool_name": tool_name, "progress": progress }),
            )],
            EventBody::ToolCompleted {
                node_id,
                tool_name,
                output,
                is_error,
            } => {
                let mut envelopes = vec![base(
                    "workflow.tool.completed",
                    NodeKind::Tool,
                    Some(node_id.clone()),
                    json!({ "tool_name": tool_name, "output": output, "is_error": is_error }),
                )];
                if let Some(manifest) = extract_manifest(output) {
                    envelopes.push(base(
                        "workflow.artifact.manifest",
                        NodeKind::Artifact,
                        Some(node_id.clone()),
                        json!({ "tool_name": tool_name, "attachments": manifest }),
                    ));
                }
                envelopes
            }
            EventBody::ResultFinal {
                content,
                stream_finished,
            } => vec![base(
                "workflow.result.final",
                NodeKind::Result,
                None,
                json!({ "content": content, "stream_finished": stream_finished }),
            )],
            EventBody::ResultCancelled { reason } => vec![base(
                "workflow.result.cancelled",
                NodeKind::Result,
                None,
                json!({ "reason": reason }),
            )],
            EventBody::Diagnostic { label, data } => vec![base(
                &format!("workflow.diagnostic.{label}"),
                NodeKind::Diagnostic,
                None,
                data.clone(),
            )],
            EventBody::BackgroundTaskDispatched {
                task_id,
                description,
            } => vec![base(
                "background_task.dispatched",
                NodeKind::Background,
                Some(task_id.to_string()),
                json!({ "task_id": task_id.as_str(), "description": description }),
            )],
            EventBody::BackgroundTaskCompleted {
                task_id,
                success,
                summary,
            } => vec![base(
                "background_task.completed",
                NodeKind::Background,
                Some(task_id.to_string()),
                json!({ "task_id": task_id.as_str(), "success": success, "summary": summary }),
            )],
            EventBody::ExternalAgentProgress { executor, data } => vec![base(
                "external_agent.progress",
                NodeKind::ExternalAgent,
                None,
                json!({ "executor": executor, "data": data }),
            )],
            EventBody::InputReceived { content } => vec![base(
                "workflow.input.received",
                NodeKind::Input,
                None,
                json!({ "content": content }),
            )],
            EventBody::ProactiveContextRefresh { query, injected } => vec![base(
                "proactive.context.refresh",
                NodeKind::Diagnostic,
                None,
                json!({ "query": query, "injected": injected }),
            )],
            EventBody::SubtaskWrapper {
                subflow_parent_run_id,
                inner,
            } => {
                let tally = state.tallies.entry(subflow_parent_run_id.clone()).or_default();
                update_tally(tally, inner);
                let tally_snapshot = tally.clone();
                let event_name = if inner.is_terminal() {
                    "workflow.subflow.completed"
                } else {
                    "workflow.subflow.progress"
                };
                vec![base(
                    event_name,
                    NodeKind::Subflow,
                    None,
                    json!({
                        "parent_run_id": subflow_parent_run_id.as_str(),
                        "tally": tally_snapshot,
                    }),
                )]
            }
        }
    }

    /// The most recently seen, already-sanitized workflow snapshot, if any.
    pub async fn last_snapshot(&self) -> Option<WorkflowSnapshot> {
        self.state.lock().await.last_snapshot.clone()
    }
}

fn extract_manifest(output: &str) -> Option<serde_json::Value> {
    let parsed: serde_json::Value = serde_json::from_str(output).ok()?;
    let obj = parsed.as_object()?;
    obj.get("manifest")
        .or_else(|| obj.get("attachments"))
        .cloned()
}

fn update_tally(tally: &mut SubflowTally, inner: &Event) {
    match &inner.body {
        EventBody::BackgroundTaskDispatched { .. } => {
            tally.total += 1;
        }
        EventBody::BackgroundTaskCompleted { success, .. } => {
            tally.completed += 1;
            if *success {
                tally.success += 1;
            } else {
                tally.failed += 1;
            }
        }
        EventBody::ToolCompleted { .. } => {
            tally.tool_calls += 1;
        }
        EventBody::ResultFinal {
            stream_finished: true,
            ..
        } => {
            tally.completed += 1;
            tally.success += 1;
        }
        EventBody::ResultCancelled { .. } => {
            tally.completed += 1;
            tally.failed += 1;
        }
        _ => {}
    }
}

#[async_trait]
impl EventListener for EnvelopeTranslator {
    async fn on_event(&self, event: Event) {
        let envelopes = self.translate(&event).await;
        for envelope in envelopes {
            self.inner.on_envelope(envelope).await;
        }
    }
}

fn _status_is_hashable(_: NodeStatus) {}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::{AgentLevel, EventHeader, WorkflowPhase};
    use fulcrum_proto::{BackgroundTaskId, CausationId, CorrelationId, EventId, SessionId, WorkflowId};
    use std::sync::Mutex as StdMutex;

    fn header(seq: u64) -> EventHeader {
        EventHeader {
            agent_level: AgentLevel::Core,
            session_id: SessionId::new("s-1"),
            run_id: RunId::new("r-1"),
            parent_run_id: None,
            correlation_id: CorrelationId::new("r-1"),
            causation_id: CausationId::new("r-1"),
            event_id: EventId::new(format!("e-{seq}")),
            seq,
            timestamp: chrono::Utc::now(),
        }
    }

    struct CapturingListener {
        captured: StdMutex<Vec<EventEnvelope>>,
    }

    impl CapturingListener {
        fn new() -> Self {
            Self {
                captured: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EnvelopeListener for CapturingListener {
        async fn on_envelope(&self, envelope: EventEnvelope) {
            self.captured.lock().unwrap().push(envelope);
        }
    }

    #[tokio::test]
    async fn tool_recorder_aggregate_node_is_filtered() {
        let listener = Arc::new(CapturingListener::new());
        let translator = EnvelopeTranslator::new(listener.clone());

        let event = Event::new(
            header(1),
            EventBody::NodeStarted {
                node_id: "react:iter:1:tools".into(),
                input: None,
            },
        );
        let envelopes = translator.translate(&event).await;
        assert!(envelopes.is_empty());
    }

    #[tokio::test]
    async fn child_tool_node_is_preserved() {
        let listener = Arc::new(CapturingListener::new());
        let translator = EnvelopeTranslator::new(listener.clone());

        let event = Event::new(
            header(1),
            EventBody::NodeStarted {
                node_id: "react:iter:1:tool:file_read:0".into(),
                input: None,
            },
        );
        let envelopes = translator.translate(&event).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].node_kind, NodeKind::Tool);
    }

    #[tokio::test]
    async fn snapshot_sanitization_removes_aggregate_nodes() {
        let listener = Arc::new(CapturingListener::new());
        let translator = EnvelopeTranslator::new(listener.clone());

        let mut snapshot = WorkflowSnapshot::empty(WorkflowId::new("wf-1"));
        snapshot.order = vec![
            "react:iter:1:tools".into(),
            "react:iter:1:tool:file_read:0".into(),
        ];
        snapshot.nodes.insert(
            "react:iter:1:tools".into(),
            fulcrum_core::WorkflowNode::pending("react:iter:1:tools", None),
        );
        snapshot.nodes.insert(
            "react:iter:1:tool:file_read:0".into(),
            fulcrum_core::WorkflowNode::pending("react:iter:1:tool:file_read:0", None),
        );
        snapshot.phase = WorkflowPhase::Running;

        let event = Event::new(header(1), EventBody::LifecycleUpdated { snapshot });
        let envelopes = translator.translate(&event).await;
        assert_eq!(envelopes.len(), 1);
        let sanitized = &envelopes[0].payload["snapshot"];
        let order = sanitized["order"].as_array().unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0], "react:iter:1:tool:file_read:0");
    }

    #[tokio::test]
    async fn context_propagates_workflow_id_to_later_events() {
        let listener = Arc::new(CapturingListener::new());
        let translator = EnvelopeTranslator::new(listener.clone());

        let mut snapshot = WorkflowSnapshot::empty(WorkflowId::new("wf-42"));
        snapshot.phase = WorkflowPhase::Running;
        translator
            .translate(&Event::new(
                header(1),
                EventBody::LifecycleUpdated { snapshot },
            ))
            .await;

        let progress = translator
            .translate(&Event::new(
                header(2),
                EventBody::ToolProgress {
                    node_id: "react:iter:1:tool:file_read:0".into(),
                    tool_name: "file_read".into(),
                    progress: json!({}),
                },
            ))
            .await;

        assert_eq!(progress[0].workflow_id, Some(WorkflowId::new("wf-42")));
    }

    #[tokio::test]
    async fn artifact_manifest_synthesized_from_tool_output() {
        let listener = Arc::new(CapturingListener::new());
        let translator = EnvelopeTranslator::new(listener.clone());

        let event = Event::new(
            header(1),
            EventBody::ToolCompleted {
                node_id: "react:iter:1:tool:generate_image:0".into(),
                tool_name: "generate_image".into(),
                output: json!({"manifest": ["image_1.png"]}).to_string(),
                is_error: false,
            },
        );
        let envelopes = translator.translate(&event).await;
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[1].event, "workflow.artifact.manifest");
    }

    #[tokio::test]
    async fn subflow_tally_accumulates_across_events() {
        let listener = Arc::new(CapturingListener::new());
        let translator = EnvelopeTranslator::new(listener.clone());
        let parent = RunId::new("parent-1");

        let dispatched = Event::new(
            header(1),
            EventBody::SubtaskWrapper {
                subflow_parent_run_id: parent.clone(),
                inner: Box::new(Event::new(
                    header(1),
                    EventBody::BackgroundTaskDispatched {
                        task_id: BackgroundTaskId::new("bg-1"),
                        description: "alpha".into(),
                    },
                )),
            },
        );
        translator.translate(&dispatched).await;

        let completed = Event::new(
            header(2),
            EventBody::SubtaskWrapper {
                subflow_parent_run_id: parent.clone(),
                inner: Box::new(Event::new(
                    header(2),
                    EventBody::BackgroundTaskCompleted {
                        task_id: BackgroundTaskId::new("bg-1"),
                        success: true,
                        summary: "done".into(),
                    },
                )),
            },
        );
        let envelopes = translator.translate(&completed).await;
        assert_eq!(envelopes[0].event, "workflow.subflow.completed");
        let tally = &envelopes[0].payload["tally"];
        assert_eq!(tally["total"], 1);
        assert_eq!(tally["success"], 1);
    }
}

//! `AgentCoordinator` (C6): session lifecycle, event-listener wiring,
//! and stage sequencing for one `ExecuteTask` call (§4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use fulcrum_background::{
    BackgroundTaskManager, ExternalAgentExecutor, InternalAgentRunner, InternalRunRequest,
    ParentRunContext,
};
use fulcrum_core::{
    AgentLevel, Message, MessageSource, StopReason, TaskResult, TaskState,
};
use fulcrum_events::{EnvelopeListener, EnvelopeTranslator, EventListener, SerializingEventRouter};
use fulcrum_proto::{CancellationToken, CausationId, CorrelationId, RunId, SessionId, WorkflowId};
use fulcrum_proto::HookContext;
use fulcrum_proto::HookPoint;
use fulcrum_proto::HookAction;
use fulcrum_react::{ReactEngine, RunOverrides};
use fulcrum_workflow::{LocalWorkflowTracker, TrackerIdentity, WorkflowTracker};

use crate::error::CoordinatorError;
use crate::ports::{
    AttachmentMigrator, PrepareContext, PreparationService, SessionStore, SessionTitleUpdater,
};
use crate::title::PlanSessionTitleRecorder;

/// A sink that discards every envelope. Used for background sub-runs:
/// `fulcrum-background` has no seam to forward a child run's events
/// into the parent's own listener chain yet, so a subagent's progress
/// is observed by polling `BackgroundTaskManager::status`/`collect`
/// rather than by streaming — see `DESIGN.md`.
struct NullEnvelopeListener;

#[async_trait]
impl EnvelopeListener for NullEnvelopeListener {
    async fn on_envelope(&self, _envelope: fulcrum_events::EventEnvelope) {}
}

/// What one `ExecuteTask` call is invoked with (§4.6 step 1-2).
pub struct ExecuteTaskRequest {
    /// `None` to start a fresh session, `Some` to continue an existing
    /// one.
    pub session_id: Option<SessionId>,
    /// The caller's prompt for this call.
    pub prompt: String,
    /// Whether this call is a background sub-run.
    pub is_subagent: bool,
    /// Tier of the agent hierarchy this run belongs to.
    pub agent_level: AgentLevel,
    /// The run that dispatched this one, if any.
    pub parent_run_id: Option<RunId>,
    /// Root of this run's causal chain; inherited unchanged if this is
    /// a subagent run, minted fresh for a top-level one.
    pub correlation_id: Option<CorrelationId>,
    /// Immediate causal parent of this run.
    pub causation_id: Option<CausationId>,
    /// Per-call overrides layered onto the environment's `ReactConfig`.
    pub overrides: RunOverrides,
}

impl ExecuteTaskRequest {
    /// A fresh, top-level request with no overrides.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            session_id: None,
            prompt: prompt.into(),
            is_subagent: false,
            agent_level: AgentLevel::Core,
            parent_run_id: None,
            correlation_id: None,
            causation_id: None,
            overrides: RunOverrides::default(),
        }
    }
}

/// Adapts one coordinator into the narrow seam `fulcrum-background`
/// recurses through for `"internal"` dispatches (§4.4, §4.6 step 6).
struct CoordinatorRunner(Arc<AgentCoordinator>);

#[async_trait]
impl InternalAgentRunner for CoordinatorRunner {
    async fn run(
        &self,
        request: InternalRunRequest,
        cancel: CancellationToken,
    ) -> Result<TaskResult, String> {
        let exec_request = ExecuteTaskRequest {
            session_id: Some(request.session_id),
            prompt: request.prompt,
            is_subagent: true,
            agent_level: request.agent_level,
            parent_run_id: Some(request.parent_run_id),
            correlation_id: Some(request.correlation_id),
            causation_id: Some(request.causation_id),
            overrides: RunOverrides::default(),
        };
        self.0
            .execute_task(exec_request, Arc::new(NullEnvelopeListener), cancel)
            .await
            .map_err(|err| err.to_string())
    }
}

/// Sequences session lifecycle, listener wiring, environment
/// preparation, and the ReAct run itself for every `ExecuteTask` call
/// (§4.6). Cheaply cloneable: construct once per deployment and share.
pub struct AgentCoordinator {
    sessions: Arc<dyn SessionStore>,
    preparation: Arc<dyn PreparationService>,
    attachments: Arc<dyn AttachmentMigrator>,
    title_updater: Option<Arc<dyn SessionTitleUpdater>>,
    external_executors: HashMap<String, Arc<dyn ExternalAgentExecutor>>,
}

impl AgentCoordinator {
    /// Build a coordinator from its collaborator ports.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        preparation: Arc<dyn PreparationService>,
        attachments: Arc<dyn AttachmentMigrator>,
        title_updater: Option<Arc<dyn SessionTitleUpdater>>,
        external_executors: HashMap<String, Arc<dyn ExternalAgentExecutor>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            preparation,
            attachments,
            title_updater,
            external_executors,
        })
    }

    /// Run the full `ExecuteTask` flow (§4.6 steps 1-10).
    pub async fn execute_task(
        self: &Arc<Self>,
        request: ExecuteTaskRequest,
        listener: Arc<dyn EnvelopeListener>,
        cancel: CancellationToken,
    ) -> Result<TaskResult, CoordinatorError> {
        // Step 1: EnsureSession.
        let (session_id, mut record) = self.sessions.ensure(request.session_id).await?;

        // Step 2: derive run identity.
        let run_id = RunId::new(format!("run-{}", Uuid::new_v4()));
        let correlation_id = request
            .correlation_id
            .unwrap_or_else(|| CorrelationId::new(run_id.as_str()));
        let causation_id = request
            .causation_id
            .unwrap_or_else(|| CausationId::new(run_id.as_str()));
        let log_id = format!("{session_id}:{run_id}");
        info!(log_id = %log_id, subagent = request.is_subagent, "execute_task starting");

        let identity = TrackerIdentity {
            agent_level: request.agent_level,
            session_id: session_id.clone(),
            run_id: run_id.clone(),
            parent_run_id: request.parent_run_id.clone(),
            correlation_id: correlation_id.clone(),
            causation_id: causation_id.clone(),
        };
        let workflow_id = WorkflowId::new(run_id.as_str());
        let (sink, mut sink_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(LocalWorkflowTracker::new(workflow_id, identity, sink));
        let tracker_dyn: Arc<dyn WorkflowTracker> = tracker.clone();
        let emitter_dyn: fulcrum_workflow::SharedWorkflowEmitter = tracker.clone();

        // Step 3: wrap the caller's listener. Order, innermost first:
        // translator, then (non-subagent only) the title recorder,
        // then the serializing router.
        let translator: Arc<dyn EventListener> = Arc::new(EnvelopeTranslator::new(listener));
        let captured_title = Arc::new(StdMutex::new(None));
        let routed: Arc<dyn EventListener> = if !request.is_subagent {
            if let Some(updater) = self.title_updater.clone() {
                Arc::new(PlanSessionTitleRecorder::new(
                    translator,
                    updater,
                    session_id.clone(),
                    captured_title.clone(),
                ))
            } else {
                translator
            }
        } else {
            translator
        };
        let router = Arc::new(SerializingEventRouter::new(routed));
        let pump = {
            let router = router.clone();
            tokio::spawn(async move {
                while let Some(event) = sink_rx.recv().await {
                    router.on_event(event).await;
                }
            })
        };

        // Step 4: prepare the execution environment.
        tracker_dyn.ensure_node("prepare", None).await;
        tracker_dyn.start_node("prepare").await;
        let prepare_ctx = PrepareContext {
            session_id: session_id.clone(),
            session: record.clone(),
            is_subagent: request.is_subagent,
            prompt: request.prompt.clone(),
        };
        let mut environment = match self.preparation.prepare(&prepare_ctx).await {
            Ok(env) => {
                tracker_dyn
                    .complete_success("prepare", None)
                    .await;
                env
            }
            Err(err) => {
                tracker_dyn
                    .complete_failure("prepare", err.to_string())
                    .await;
                drop(tracker);
                let _ = tokio::time::timeout(std::time::Duration::from_secs(2), pump).await;
                return Err(err);
            }
        };

        // Step 5: pre-task proactive hooks, non-subagent only.
        if !request.is_subagent {
            let ctx = HookContext::new(HookPoint::PreTask);
            if let HookAction::InjectMessage { content } = environment.hooks.dispatch(&ctx).await {
                environment.initial_messages.push(Message::new(
                    fulcrum_core::MessageRole::System,
                    content,
                    MessageSource::Proactive,
                ));
            }
        }

        // Step 6: build the engine, wiring background dispatch back
        // into this coordinator.
        let mut engine = ReactEngine::new(
            environment.config.clone(),
            environment.provider.clone(),
            environment.tools.clone(),
            environment.tool_timeouts.clone(),
            environment.context_strategy.clone(),
            environment.hooks.clone(),
        );
        if let Some(memory) = environment.memory.clone() {
            engine = engine.with_memory(memory);
        }
        let background = Arc::new(BackgroundTaskManager::new(
            ParentRunContext {
                session_id: session_id.clone(),
                run_id: run_id.clone(),
                correlation_id: correlation_id.clone(),
                causation_id: causation_id.clone(),
            },
            Arc::new(CoordinatorRunner(self.clone())),
            self.external_executors.clone(),
        ));
        engine = engine.with_background(background.clone());

        let mut state = TaskState::new(session_id.clone(), run_id.clone(), request.parent_run_id.clone());
        state.messages = environment.initial_messages.clone();

        // Step 7: invoke the engine.
        tracker_dyn.ensure_node("execute", None).await;
        tracker_dyn.start_node("execute").await;
        let task_result = match engine
            .execute(&mut state, tracker_dyn.clone(), emitter_dyn, request.overrides, cancel.clone())
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracker_dyn
                    .complete_failure("execute", err.to_string())
                    .await;
                background.shutdown();
                drop(tracker);
                let _ = tokio::time::timeout(std::time::Duration::from_secs(2), pump).await;
                return Err(CoordinatorError::Execution(err));
            }
        };

        if task_result.stop_reason == StopReason::Cancelled {
            tracker_dyn
                .complete_failure("execute", "cancelled".to_string())
                .await;
            background.shutdown();
            self.persist_best_effort(&session_id, &mut record, &task_result, &captured_title)
                .await;
            drop(tracker);
            let _ = tokio::time::timeout(std::time::Duration::from_secs(2), pump).await;
            return Err(CoordinatorError::Cancelled(Box::new(task_result)));
        }
        tracker_dyn
            .complete_success(
                "execute",
                Some(serde_json::json!({"stop_reason": task_result.stop_reason})),
            )
            .await;
        background.shutdown();

        // Step 8: summarize.
        tracker_dyn.ensure_node("summarize", None).await;
        tracker_dyn.start_node("summarize").await;
        let preview: String = task_result.final_answer.chars().take(160).collect();
        tracker_dyn
            .complete_success(
                "summarize",
                Some(serde_json::json!({"preview": preview})),
            )
            .await;

        // Step 9: persist, skipped in subagent contexts.
        if !request.is_subagent {
            tracker_dyn.ensure_node("persist", None).await;
            tracker_dyn.start_node("persist").await;
            match self
                .persist(&session_id, &mut record, &task_result, &run_id, &request.parent_run_id, &captured_title)
                .await
            {
                Ok(()) => {
                    tracker_dyn
                        .complete_success("persist", None)
                        .await;
                }
                Err(err) => {
                    tracker_dyn
                        .complete_failure("persist", err.to_string())
                        .await;
                    warn!(log_id = %log_id, %err, "session persist failed");
                }
            }
        }

        // Step 10: return the result with the full workflow snapshot
        // (including the coordinator's own stages) attached.
        let snapshot = tracker_dyn.snapshot().await;
        drop(tracker);
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), pump).await;

        let mut result = task_result;
        result.workflow = snapshot;
        Ok(result)
    }

    async fn persist(
        &self,
        session_id: &SessionId,
        record: &mut crate::ports::SessionRecord,
        task_result: &TaskResult,
        run_id: &RunId,
        parent_run_id: &Option<RunId>,
        captured_title: &Arc<StdMutex<Option<String>>>,
    ) -> Result<(), CoordinatorError> {
        let kept: Vec<Message> = task_result
            .messages
            .iter()
            .filter(|m| m.source != MessageSource::UserHistory)
            .cloned()
            .collect();
        record.messages.extend(kept);

        let externalized = self
            .attachments
            .externalize(task_result.attachments.clone())
            .await?;
        record.attachments.extend(externalized);

        record.metadata.retain(|key, _| !key.starts_with("pending_"));
        record
            .metadata
            .insert("session_id".to_string(), serde_json::json!(session_id.as_str()));
        record
            .metadata
            .insert("last_task_id".to_string(), serde_json::json!(run_id.as_str()));
        if let Some(parent) = parent_run_id {
            record.metadata.insert(
                "last_parent_task_id".to_string(),
                serde_json::json!(parent.as_str()),
            );
        }
        if let Some(title) = captured_title.lock().unwrap().clone() {
            record.metadata.insert("title".to_string(), serde_json::json!(title));
        }

        self.sessions.save(session_id, record).await
    }

    /// Best-effort persistence of whatever the run produced before
    /// cancellation cut it short; failures are logged, never returned,
    /// since the caller is already unwinding on `CoordinatorError::Cancelled`.
    async fn persist_best_effort(
        &self,
        session_id: &SessionId,
        record: &mut crate::ports::SessionRecord,
        task_result: &TaskResult,
        captured_title: &Arc<StdMutex<Option<String>>>,
    ) {
        if let Err(err) = self
            .persist(session_id, record, task_result, &task_result.run_id, &task_result.parent_run_id, captured_title)
            .await
        {
            warn!(session_id = %session_id, %err, "best-effort persist on cancellation failed");
        }
    }
}

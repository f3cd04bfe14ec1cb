//! `BackgroundTaskManager` (C4): dispatch, status, and collection of
//! detached sub-runs on behalf of a single parent run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fulcrum_core::{BackgroundTask, BackgroundTaskStatus, TaskResult};
use fulcrum_proto::{BackgroundTaskId, CancellationToken, CausationId};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, timeout, Instant};
use tracing::{info, warn};

use crate::error::BackgroundError;
use crate::executor::{
    ExternalAgentExecutor, InternalAgentRunner, InternalRunRequest, ParentRunContext,
};

/// Capacity of the completion-signaling channel (§4.4).
pub const COMPLETION_QUEUE_CAPACITY: usize = 64;

/// What a caller supplies to `dispatch` (§4.4).
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Caller-chosen ID, unique within the parent run.
    pub id: BackgroundTaskId,
    /// Human-readable description.
    pub description: String,
    /// Prompt the sub-run is dispatched with.
    pub prompt: String,
    /// `"internal"` (or empty) for the coordinator closure, otherwise
    /// an external-agent executor key.
    pub agent_type: String,
    /// The event that caused this dispatch.
    pub causation_id: CausationId,
    /// Tasks that must reach `Completed` before this one may start.
    pub depends_on: Vec<BackgroundTaskId>,
    /// Whether a collaboration-context section is prepended to the prompt.
    pub inherit_context: bool,
}

/// Lightweight status summary returned by `status()` (§4.4).
#[derive(Debug, Clone)]
pub struct BackgroundTaskSummary {
    /// Task ID.
    pub id: BackgroundTaskId,
    /// Current lifecycle state.
    pub status: BackgroundTaskStatus,
    /// Wall-clock start time.
    pub started_at: Option<chrono::DateTime<Utc>>,
    /// Wall-clock end time, set once terminal.
    pub ended_at: Option<chrono::DateTime<Utc>>,
    /// Error text, if failed.
    pub error: Option<String>,
}

impl From<&BackgroundTask> for BackgroundTaskSummary {
    fn from(task: &BackgroundTask) -> Self {
        Self {
            id: task.id.clone(),
            status: task.status,
            started_at: task.started_at,
            ended_at: task.ended_at,
            error: task.error.clone(),
        }
    }
}

struct SharedState {
    parent: ParentRunContext,
    root_cancel: CancellationToken,
    internal_runner: Arc<dyn InternalAgentRunner>,
    external_executors: HashMap<String, Arc<dyn ExternalAgentExecutor>>,
    tasks: Mutex<HashMap<BackgroundTaskId, BackgroundTask>>,
    signalled: Mutex<HashSet<BackgroundTaskId>>,
    completion_tx: mpsc::Sender<BackgroundTaskId>,
    completion_rx: Mutex<mpsc::Receiver<BackgroundTaskId>>,
}

/// Dispatches detached sub-runs for a single parent run, exposes their
/// status and results, and guarantees clean shutdown (§4.4).
///
/// Cheaply cloneable: every clone shares the same task table, root
/// cancellation token, and completion channel.
#[derive(Clone)]
pub struct BackgroundTaskManager {
    state: Arc<SharedState>,
}

impl BackgroundTaskManager {
    /// Build a manager rooted at `parent`'s identity, dispatching
    /// `"internal"` tasks through `internal_runner` and any other
    /// agent-type tag through a matching entry in `external_executors`.
    pub fn new(
        parent: ParentRunContext,
        internal_runner: Arc<dyn InternalAgentRunner>,
        external_executors: HashMap<String, Arc<dyn ExternalAgentExecutor>>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_QUEUE_CAPACITY);
        Self {
            state: Arc::new(SharedState {
                parent,
                root_cancel: CancellationToken::new(),
                internal_runner,
                external_executors,
                tasks: Mutex::new(HashMap::new()),
                signalled: Mutex::new(HashSet::new()),
                completion_tx,
                completion_rx: Mutex::new(completion_rx),
            }),
        }
    }

    /// Register a task under `request.id` and start it (or block it on
    /// unmet dependencies). Fails if the ID is already in use.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<(), BackgroundError> {
        {
            let tasks = self.state.tasks.lock().await;
            if tasks.contains_key(&request.id) {
                return Err(BackgroundError::Duplicate(request.id.to_string()));
            }
            for dep in &request.depends_on {
                if !tasks.contains_key(dep) {
                    return Err(BackgroundError::UnknownDependency(dep.to_string()));
                }
            }
        }

        let status = if request.depends_on.is_empty() {
            BackgroundTaskStatus::Pending
        } else {
            BackgroundTaskStatus::Blocked
        };

        let task = BackgroundTask {
            id: request.id.clone(),
            description: request.description,
            prompt: request.prompt,
            agent_type: request.agent_type,
            causation_id: request.causation_id,
            status,
            started_at: None,
            ended_at: None,
            depends_on: request.depends_on,
            inherit_context: request.inherit_context,
            result: None,
            error: None,
        };

        self.state
            .tasks
            .lock()
            .await
            .insert(request.id.clone(), task);

        if status == BackgroundTaskStatus::Pending {
            self.spawn(request.id).await;
        }
        Ok(())
    }

    /// Lightweight summaries for the named tasks (unknown IDs are omitted).
    pub async fn status(&self, ids: &[BackgroundTaskId]) -> Vec<BackgroundTaskSummary> {
        let tasks = self.state.tasks.lock().await;
        ids.iter()
            .filter_map(|id| tasks.get(id).map(BackgroundTaskSummary::from))
            .collect()
    }

    /// Full records for the named tasks. When `wait` is set, polls
    /// until every requested task is terminal or `timeout_after` elapses.
    pub async fn collect(
        &self,
        ids: &[BackgroundTaskId],
        wait: bool,
        timeout_after: Duration,
    ) -> HashMap<BackgroundTaskId, BackgroundTask> {
        if wait {
            let deadline = Instant::now() + timeout_after;
            let mut ticker = interval(Duration::from_millis(50));
            loop {
                if self.all_terminal(ids).await || Instant::now() >= deadline {
                    break;
                }
                ticker.tick().await;
            }
        }

        let tasks = self.state.tasks.lock().await;
        ids.iter()
            .filter_map(|id| tasks.get(id).map(|task| (id.clone(), task.clone())))
            .collect()
    }

    /// Task IDs that completed since the last call (non-blocking).
    pub async fn drain_completions(&self) -> Vec<BackgroundTaskId> {
        let mut rx = self.state.completion_rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(id) = rx.try_recv() {
            drained.push(id);
        }
        drained
    }

    /// Polls until every currently-known task is terminal or
    /// `timeout_after` elapses.
    pub async fn await_all(&self, timeout_after: Duration) {
        let ids: Vec<BackgroundTaskId> = self.state.tasks.lock().await.keys().cloned().collect();
        let _ = timeout(timeout_after, async {
            let mut ticker = interval(Duration::from_millis(50));
            while !self.all_terminal(&ids).await {
                ticker.tick().await;
            }
        })
        .await;
    }

    /// Cancels the shared root context; in-flight tasks observe
    /// cancellation and record `cancelled` status with whatever partial
    /// result they produced.
    pub fn shutdown(&self) {
        self.state.root_cancel.cancel();
    }

    async fn all_terminal(&self, ids: &[BackgroundTaskId]) -> bool {
        let tasks = self.state.tasks.lock().await;
        ids.iter().all(|id| {
            tasks
                .get(id)
                .map(|task| task.status.is_terminal())
                .unwrap_or(true)
        })
    }

    async fn spawn(&self, id: BackgroundTaskId) {
        let state = self.state.clone();
        {
            let mut tasks = state.tasks.lock().await;
            if let Some(task) = tasks.get_mut(&id) {
                task.status = BackgroundTaskStatus::Running;
                task.started_at = Some(Utc::now());
            }
        }

        tokio::spawn(async move {
            let (agent_type, prompt, id_clone) = {
                let tasks = state.tasks.lock().await;
                let task = tasks.get(&id).expect("task registered before spawn");
                (task.agent_type.clone(), task.prompt.clone(), task.id.clone())
            };

            let prompt = if let Some(extra) = collaboration_context(&state, &id_clone).await {
                format!("{extra}\n\n{prompt}")
            } else {
                prompt
            };

            let child_cancel = state.root_cancel.child_token();
            let outcome = run_one(&state, &agent_type, prompt, child_cancel).await;

            finalize(&state, &id_clone, outcome).await;
        });
    }
}

async fn collaboration_context(state: &Arc<SharedState>, id: &BackgroundTaskId) -> Option<String> {
    let tasks = state.tasks.lock().await;
    let task = tasks.get(id)?;
    if !task.inherit_context || task.depends_on.is_empty() {
        return None;
    }
    let mut section = String::from("Context from completed collaborating tasks:\n");
    for dep in &task.depends_on {
        if let Some(dep_task) = tasks.get(dep) {
            let answer = dep_task
                .result
                .as_ref()
                .map(|r| r.final_answer.as_str())
                .unwrap_or("");
            section.push_str(&format!("- {}: {}\n", dep.as_str(), answer));
        }
    }
    Some(section)
}

enum Outcome {
    Completed(TaskResult),
    Failed(String),
    Cancelled,
}

async fn run_one(
    state: &Arc<SharedState>,
    agent_type: &str,
    prompt: String,
    cancel: CancellationToken,
) -> Outcome {
    let run_request = InternalRunRequest {
        session_id: state.parent.session_id.clone(),
        run_id: fulcrum_proto::RunId::new(format!("bg-run-{}", uuid::Uuid::new_v4())),
        parent_run_id: fulcrum_proto::RunId::new(state.parent.causation_id.as_str()),
        correlation_id: state.parent.correlation_id.clone(),
        causation_id: CausationId::new(state.parent.run_id.as_str()),
        prompt,
        agent_level: fulcrum_core::AgentLevel::Subagent,
    };

    let is_internal = agent_type.is_empty() || agent_type == "internal";
    let inner_cancel = cancel.clone();
    let state_for_run = state.clone();
    let agent_type_owned = agent_type.to_string();

    let run_future = async move {
        if is_internal {
            state_for_run
                .internal_runner
                .run(run_request, inner_cancel)
                .await
        } else {
            match state_for_run.external_executors.get(&agent_type_owned) {
                Some(executor) => {
                    executor
                        .execute(&agent_type_owned, run_request.prompt, inner_cancel)
                        .await
                }
                None => Err(format!(
                    "no executor registered for agent type: {agent_type_owned}"
                )),
            }
        }
    };

    // Runners observe `cancel` cooperatively and return promptly; check
    // cancellation after the future resolves rather than racing it in a
    // `select!`, which would pick nondeterministically between the two.
    let result = run_future.await;
    if cancel.is_cancelled() {
        return Outcome::Cancelled;
    }
    match result {
        Ok(task_result) => Outcome::Completed(task_result),
        Err(message) => Outcome::Failed(message),
    }
}

async fn finalize(state: &Arc<SharedState>, id: &BackgroundTaskId, outcome: Outcome) {
    {
        let mut tasks = state.tasks.lock().await;
        if let Some(task) = tasks.get_mut(id) {
            task.ended_at = Some(Utc::now());
            match outcome {
                Outcome::Completed(result) => {
                    task.status = BackgroundTaskStatus::Completed;
                    task.result = Some(result);
                }
                Outcome::Failed(message) => {
                    task.status = BackgroundTaskStatus::Failed;
                    task.error = Some(message);
                }
                Outcome::Cancelled => {
                    task.status = BackgroundTaskStatus::Cancelled;
                }
            }
        }
    }

    signal_completion(state, id).await;
    unblock_dependents(state).await;
}

async fn signal_completion(state: &Arc<SharedState>, id: &BackgroundTaskId) {
    let mut signalled = state.signalled.lock().await;
    if signalled.contains(id) {
        return;
    }
    signalled.insert(id.clone());
    drop(signalled);

    if state.completion_tx.try_send(id.clone()).is_err() {
        warn!(task_id = %id, "background task manager: completion queue full, drop logged");
    } else {
        info!(task_id = %id, "background task completed");
    }
}

async fn unblock_dependents(state: &Arc<SharedState>) {
    let ready: Vec<BackgroundTaskId> = {
        let tasks = state.tasks.lock().await;
        tasks
            .values()
            .filter(|task| task.status == BackgroundTaskStatus::Blocked)
            .filter(|task| {
                task.dependencies_satisfied(|dep| tasks.get(dep).map(|t| &t.status))
            })
            .map(|task| task.id.clone())
            .collect()
    };

    for id in ready {
        {
            let mut tasks = state.tasks.lock().await;
            if let Some(task) = tasks.get_mut(&id) {
                task.status = BackgroundTaskStatus::Pending;
            }
        }
        let manager = BackgroundTaskManager {
            state: state.clone(),
        };
        manager.spawn(id).await;
    }
}

//! Collaborator ports `AgentCoordinator` drives: session persistence,
//! environment assembly, attachment externalization, and session
//! titling (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fulcrum_context::ContextStrategy;
use fulcrum_core::{Attachment, Message};
use fulcrum_hooks::HookRegistry;
use fulcrum_proto::SessionId;
use fulcrum_provider::Provider;
use fulcrum_react::{MemoryService, ReactConfig};
use fulcrum_tool::{ToolRegistry, ToolTimeoutPolicy};

use crate::error::CoordinatorError;

/// The durable half of a session: everything `EnsureSession` loads or
/// creates and `persist` writes back (§4.6 steps 1 and 9).
///
/// This is deliberately narrower than `TaskState` — it survives across
/// runs, where `TaskState` is scoped to one `ExecuteTask` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session-scoped conversation history, replayed into a new run's
    /// initial messages by the `PreparationService`.
    pub messages: Vec<Message>,
    /// Attachments already externalized to stable references.
    pub attachments: HashMap<String, Attachment>,
    /// Free-form metadata, including the `session_id` / `last_task_id`
    /// / `last_parent_task_id` / `title` keys persistence maintains.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Loads and saves `SessionRecord`s, and mints a fresh session when
/// `ExecuteTask` is called with no ID (§4.6 step 1: "missing ID
/// creates, known ID loads, unknown ID surfaces an error").
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve `session_id` to a record, creating one if `None`.
    ///
    /// Must return [`CoordinatorError::SessionNotFound`] for a `Some`
    /// ID with no existing record — the caller named a session that
    /// was never created, not one to silently fabricate.
    async fn ensure(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<(SessionId, SessionRecord), CoordinatorError>;

    /// Persist `record` under `session_id`, overwriting any prior
    /// save.
    async fn save(
        &self,
        session_id: &SessionId,
        record: &SessionRecord,
    ) -> Result<(), CoordinatorError>;
}

/// The assembled collaborators one `ReactEngine` run needs, built
/// fresh per `ExecuteTask` call by a [`PreparationService`] (§4.6 step
/// 4: "LLM services, tool registry, parser, initial messages").
pub struct ExecutionEnvironment {
    /// Per-run Think/Plan/Execute tuning.
    pub config: ReactConfig,
    /// The LLM client this run talks to.
    pub provider: Arc<dyn Provider>,
    /// Tools available to this run.
    pub tools: Arc<ToolRegistry>,
    /// Per-tool timeout overrides.
    pub tool_timeouts: ToolTimeoutPolicy,
    /// Compaction policy for the run's message log.
    pub context_strategy: Arc<dyn ContextStrategy>,
    /// Pre-task, iteration, tool-use, and exit hooks for this run.
    pub hooks: Arc<HookRegistry>,
    /// Optional proactive-memory collaborator.
    pub memory: Option<Arc<dyn MemoryService>>,
    /// Messages the run starts with: system prompt, replayed session
    /// history, and the caller's input, already assembled in order.
    pub initial_messages: Vec<Message>,
}

/// Context handed to a [`PreparationService`] so it can tailor the
/// environment to this particular call — a subagent run typically
/// gets a narrower tool set and no session-history replay.
pub struct PrepareContext {
    /// Resolved session this call is running against.
    pub session_id: SessionId,
    /// The loaded (or freshly created) session record.
    pub session: SessionRecord,
    /// Whether this call is a background sub-run rather than a
    /// top-level invocation.
    pub is_subagent: bool,
    /// The caller's prompt for this call.
    pub prompt: String,
}

/// Assembles an [`ExecutionEnvironment`] for one `ExecuteTask` call
/// (§4.6 step 4). Implemented by the embedding application — this
/// crate has no opinion on which provider, tools, or context strategy
/// a deployment wires up, only on the sequence it's assembled in.
#[async_trait]
pub trait PreparationService: Send + Sync {
    /// Build the environment this call runs against.
    async fn prepare(
        &self,
        ctx: &PrepareContext,
    ) -> Result<ExecutionEnvironment, CoordinatorError>;
}

/// Externalizes attachments to stable references at persistence time,
/// so only references (not inline payloads) remain in session state
/// (§4.6 step 9).
#[async_trait]
pub trait AttachmentMigrator: Send + Sync {
    /// Replace any attachment still carrying inline data with an
    /// equivalent one addressed by `uri`.
    async fn externalize(
        &self,
        attachments: HashMap<String, Attachment>,
    ) -> Result<HashMap<String, Attachment>, CoordinatorError>;
}

/// An [`AttachmentMigrator`] for deployments with nowhere to
/// externalize to — attachments are kept exactly as the run left them.
pub struct NoopAttachmentMigrator;

#[async_trait]
impl AttachmentMigrator for NoopAttachmentMigrator {
    async fn externalize(
        &self,
        attachments: HashMap<String, Attachment>,
    ) -> Result<HashMap<String, Attachment>, CoordinatorError> {
        Ok(attachments)
    }
}

/// Renames a session's display title, driven off the `plan` tool's
/// declared title (§4.6 step 3, §5: "session title update runs with a
/// 2-second deadline").
#[async_trait]
pub trait SessionTitleUpdater: Send + Sync {
    /// Set `session_id`'s title to `title`.
    async fn rename(&self, session_id: &SessionId, title: &str) -> Result<(), CoordinatorError>;
}

#![deny(missing_docs)]
//! # fulcrum — umbrella crate
//!
//! Single import surface for the fulcrum agent execution engine.
//! Re-exports the per-component crates behind feature flags, plus a
//! [`prelude`] for the common path: build an [`ExecutionEnvironment`],
//! wrap an [`EnvelopeListener`] in the translator and router, and drive
//! an [`AgentCoordinator`] through `execute_task`.

#[cfg(feature = "core")]
pub use fulcrum_context;
#[cfg(feature = "core")]
pub use fulcrum_core;
#[cfg(feature = "hooks")]
pub use fulcrum_hooks;
#[cfg(feature = "core")]
pub use fulcrum_provider;
#[cfg(feature = "core")]
pub use fulcrum_proto;
#[cfg(feature = "core")]
pub use fulcrum_tool;

#[cfg(feature = "background")]
pub use fulcrum_background;
#[cfg(feature = "budget")]
pub use fulcrum_budget;
#[cfg(feature = "config")]
pub use fulcrum_config;
#[cfg(feature = "coordinator")]
pub use fulcrum_coordinator;
#[cfg(feature = "events")]
pub use fulcrum_events;
#[cfg(feature = "react")]
pub use fulcrum_react;
#[cfg(feature = "scheduler")]
pub use fulcrum_scheduler;
#[cfg(feature = "state-memory")]
pub use fulcrum_state_memory;
#[cfg(feature = "workflow")]
pub use fulcrum_workflow;

/// Happy-path imports for composing a fulcrum engine.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use fulcrum_core::{
        Attachment, AttachmentSource, BackgroundTask, BackgroundTaskStatus, EngineError, Event,
        Job, JobStatus, Message, MessageRole, MessageSource, StopReason, TaskResult, TaskState,
        ToolCall, WorkflowNode, WorkflowSnapshot,
    };

    #[cfg(feature = "core")]
    pub use fulcrum_proto::{
        CancellationToken, Hook, HookAction, HookContext, HookPoint, RunId, Scope, SessionId,
        StateStore, WorkflowId,
    };

    #[cfg(feature = "core")]
    pub use fulcrum_tool::{ToolDyn, ToolError, ToolRegistry};

    #[cfg(feature = "core")]
    pub use fulcrum_provider::{Provider, ProviderError};

    #[cfg(feature = "core")]
    pub use fulcrum_context::{ContextStrategy, NoCompaction, SlidingWindow};

    #[cfg(feature = "hooks")]
    pub use fulcrum_hooks::HookRegistry;

    #[cfg(feature = "workflow")]
    pub use fulcrum_workflow::{LocalWorkflowTracker, WorkflowTracker};

    #[cfg(feature = "events")]
    pub use fulcrum_events::{EnvelopeListener, EnvelopeTranslator, EventEnvelope, SerializingEventRouter};

    #[cfg(feature = "background")]
    pub use fulcrum_background::{BackgroundTaskManager, DispatchRequest};

    #[cfg(feature = "react")]
    pub use fulcrum_react::{ReactConfig, ReactEngine};

    #[cfg(feature = "coordinator")]
    pub use fulcrum_coordinator::{AgentCoordinator, ExecuteTaskRequest, ExecutionEnvironment};

    #[cfg(feature = "scheduler")]
    pub use fulcrum_scheduler::{JobScheduler, SchedulerConfig};

    #[cfg(feature = "budget")]
    pub use fulcrum_budget::{BudgetManager, ModelTierTable};

    #[cfg(feature = "config")]
    pub use fulcrum_config::{ConfigCenter, ConfigStore};

    #[cfg(feature = "state-memory")]
    pub use fulcrum_state_memory::MemoryStore;
}

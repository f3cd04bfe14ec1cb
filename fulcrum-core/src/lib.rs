//! Data model for the fulcrum agent execution engine (§3).
//!
//! Messages, attachments, task state and results, the workflow graph's
//! shapes, the domain event model, background-task records, and job
//! records. This crate defines *shapes only* — the components that
//! mutate and route them (`fulcrum-workflow`, `fulcrum-events`,
//! `fulcrum-background`, `fulcrum-scheduler`, `fulcrum-react`,
//! `fulcrum-coordinator`) each depend on this one, never the reverse.

#![deny(missing_docs)]

mod attachment;
mod background_task;
mod error;
mod event;
mod job;
mod message;
mod result;
mod task_state;
mod workflow;

pub use attachment::{Attachment, AttachmentSource};
pub use background_task::{BackgroundTask, BackgroundTaskStatus};
pub use error::EngineError;
pub use event::{AgentLevel, Event, EventBody, EventHeader};
pub use job::{Job, JobStatus};
pub use message::{Message, MessageRole, MessageSource, ToolCall, ToolResultPayload};
pub use result::{StopReason, TaskResult};
pub use task_state::{
    BeliefEntry, FeedbackSignal, ImportantNote, PlanEntry, TaskState, ToolResultRecord,
    FEEDBACK_SIGNAL_QUEUE_CAPACITY,
};
pub use workflow::{NodeStatus, WorkflowNode, WorkflowPhase, WorkflowSnapshot};

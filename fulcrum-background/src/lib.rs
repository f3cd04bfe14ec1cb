#![deny(missing_docs)]
//! BackgroundTaskManager (C4): in-process dispatch, status, and
//! collection of detached sub-runs spawned by tools (§4.4).
//!
//! Execution routing is grounded in `neuron-orch-local::LocalOrch`'s
//! `HashMap<String, Arc<dyn Operator>>` dispatch-by-key pattern,
//! generalized into two arms: the coordinator closure for `"internal"`
//! (or empty) agent-type tags, and an injected
//! [`ExternalAgentExecutor`] table for everything else.

mod error;
mod executor;
mod manager;

pub use error::BackgroundError;
pub use executor::{
    ExternalAgentExecutor, InternalAgentRunner, InternalRunRequest, ParentRunContext,
};
pub use manager::{
    BackgroundTaskManager, BackgroundTaskSummary, DispatchRequest, COMPLETION_QUEUE_CAPACITY,
};

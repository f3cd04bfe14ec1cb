//! Protocol substrate for the fulcrum agent execution engine.
//!
//! This crate is deliberately small: typed IDs, the hook pipeline, the
//! state-store port, and cooperative cancellation. Everything here is
//! a seam the rest of the workspace builds against — the concrete
//! session store, the LLM provider, and the tool registry all live in
//! their own crates and depend on this one, not the other way around.

#![deny(missing_docs)]

mod cancel;
mod duration;
mod error;
mod hook;
mod id;
mod state;

pub use cancel::CancellationToken;
pub use duration::DurationMs;
pub use error::{HookError, StateError};
pub use hook::{Hook, HookAction, HookContext, HookPoint};
pub use id::{
    BackgroundTaskId, CausationId, CorrelationId, EventId, JobId, RunId, SessionId, WorkflowId,
};
pub use state::{Scope, SearchResult, StateReader, StateStore};

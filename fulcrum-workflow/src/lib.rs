#![deny(missing_docs)]
//! WorkflowTracker (C1): an append-only graph of named stages with
//! status transitions and snapshots.
//!
//! Every run gets exactly one tracker, constructed by the coordinator
//! (§4.6 step 6) and held by the ReAct runtime for the run's lifetime.
//! The tracker records the causal structure of the run as a graph and
//! emits a lifecycle event on every state transition; it never looks
//! back into whatever consumes those events (§9).

mod error;
mod graph;
mod tracker;

pub use error::WorkflowError;
pub use tracker::{
    LocalWorkflowTracker, SharedWorkflowEmitter, SharedWorkflowTracker, TrackerIdentity,
    WorkflowEventEmitter, WorkflowTracker,
};

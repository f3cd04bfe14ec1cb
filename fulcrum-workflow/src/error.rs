//! Errors specific to the workflow tracker.

use thiserror::Error;

/// Errors produced by a [`crate::WorkflowTracker`] implementation.
///
/// Unknown node IDs are never an error per §4.1 ("unknown IDs are logged
/// but do not panic; operations on unknown IDs create the node lazily")
/// — this enum exists for the surrounding plumbing (event emission,
/// snapshot serialization), not for tracker-graph invariant violations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The event sink this tracker emits lifecycle events into has been
    /// closed (the consuming router/translator was dropped).
    #[error("workflow event sink closed for node {0}")]
    SinkClosed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<WorkflowError> for fulcrum_core::EngineError {
    fn from(err: WorkflowError) -> Self {
        fulcrum_core::EngineError::Other(Box::new(err))
    }
}

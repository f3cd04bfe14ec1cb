//! Errors specific to dispatch and collection.

use thiserror::Error;

/// Errors produced by [`crate::BackgroundTaskManager`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackgroundError {
    /// `dispatch` was called with an ID already registered.
    #[error("background task ID already in use: {0}")]
    Duplicate(String),

    /// No executor is registered for the task's agent-type tag.
    #[error("no executor registered for agent type: {0}")]
    MissingExecutor(String),

    /// A dependency named in `depends_on` was never dispatched.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<BackgroundError> for fulcrum_core::EngineError {
    fn from(err: BackgroundError) -> Self {
        match err {
            BackgroundError::Duplicate(id) => fulcrum_core::EngineError::BackgroundDuplicate(id),
            BackgroundError::MissingExecutor(tag) => {
                fulcrum_core::EngineError::BackgroundMissingExecutor(tag)
            }
            other => fulcrum_core::EngineError::Other(Box::new(other)),
        }
    }
}

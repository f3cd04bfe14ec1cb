//! Errors raised while sequencing one `ExecuteTask` call.

use thiserror::Error;

use fulcrum_core::TaskResult;
use fulcrum_proto::SessionId;

/// Errors from session resolution, preparation, and the run itself
/// (§4.6).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// `EnsureSession` was given an ID with no corresponding record.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Loading or saving a session record failed.
    #[error("session store failed: {0}")]
    SessionStoreFailed(String),

    /// Assembling the execution environment failed; the run never
    /// started.
    #[error("preparation failed: {0}")]
    PreparationFailed(String),

    /// Externalizing attachments during persistence failed.
    #[error("attachment migration failed: {0}")]
    AttachmentMigrationFailed(String),

    /// The run was cancelled before it could finish. Carries the
    /// partial `TaskResult` (stop_reason = `cancelled`) the engine had
    /// already assembled, per spec.md §7: callers get both the context
    /// error and the partial result, never just one.
    #[error("run cancelled")]
    Cancelled(Box<TaskResult>),

    /// The ReAct runtime itself returned an error.
    #[error("execution failed: {0}")]
    Execution(#[from] fulcrum_react::ReactError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<CoordinatorError> for fulcrum_core::EngineError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::SessionNotFound(id) => {
                fulcrum_core::EngineError::SessionNotFound(id.to_string())
            }
            CoordinatorError::Cancelled(_) => fulcrum_core::EngineError::Cancelled,
            CoordinatorError::Execution(err) => err.into(),
            other => fulcrum_core::EngineError::Other(Box::new(other)),
        }
    }
}

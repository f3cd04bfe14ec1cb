//! Errors raised by [`crate::JobScheduler`].

use thiserror::Error;

/// Errors from cron evaluation, job lookup, and persistence.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A cron expression wasn't a valid standard 5-field expression.
    #[error("invalid cron expression: {0}")]
    InvalidCronExpr(String),

    /// An operation named a job ID the scheduler doesn't know.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Loading or saving a job through the job store failed.
    #[error("job persistence failed: {job}: {message}")]
    JobPersist {
        /// Job name.
        job: String,
        /// Error text from the store.
        message: String,
    },

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<SchedulerError> for fulcrum_core::EngineError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobPersist { job, message } => {
                fulcrum_core::EngineError::JobPersist { job, message }
            }
            other => fulcrum_core::EngineError::Other(Box::new(other)),
        }
    }
}

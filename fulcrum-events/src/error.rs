//! Errors specific to the translator and the per-run router.

use thiserror::Error;

/// Errors produced by the translator or the [`crate::SerializingEventRouter`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventsError {
    /// A run's queue was closed (retired or never created) when a
    /// producer tried to enqueue into it.
    #[error("event queue for run {0} is closed")]
    QueueClosed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<EventsError> for fulcrum_core::EngineError {
    fn from(err: EventsError) -> Self {
        fulcrum_core::EngineError::Other(Box::new(err))
    }
}

//! Error types shared by the protocol traits.
//!
//! Errors specific to one component (the ReAct runtime, the scheduler,
//! the budget manager, ...) live in that component's crate; only the
//! errors produced by the ports defined here live in this module.

use thiserror::Error;

/// State store errors, produced by the session/attachment persistence
/// port.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// Key not found in the given scope.
    #[error("not found: {scope}/{key}")]
    NotFound {
        /// The scope that was searched.
        scope: String,
        /// The key that was not found.
        key: String,
    },

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Hook errors. These are logged but do NOT halt the run — use
/// `HookAction::Halt` to halt.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook execution failed.
    #[error("hook failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

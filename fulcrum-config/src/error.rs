//! Errors raised by [`crate::ConfigCenter`] and its backing store.

use thiserror::Error;

/// Errors from loading, persisting, or merging configuration overrides.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The backing store's read failed.
    #[error("config load failed: {0}")]
    LoadFailed(String),

    /// The backing store's write failed.
    #[error("config save failed: {0}")]
    SaveFailed(String),

    /// The override document didn't parse as JSON.
    #[error("config document is not valid JSON: {0}")]
    Malformed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

//! Errors raised by [`crate::BudgetManager`].

use thiserror::Error;

/// Errors from budget accounting.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BudgetError {
    /// `RecordUsage`/`CheckBudget`/`SuggestDowngrade` named a model tier
    /// not present in the manager's cost table.
    #[error("unknown model tier: {0}")]
    UnknownModel(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<BudgetError> for fulcrum_core::EngineError {
    fn from(err: BudgetError) -> Self {
        fulcrum_core::EngineError::Other(Box::new(err))
    }
}

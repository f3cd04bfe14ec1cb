//! Errors raised by the ReAct runtime itself, converted at the
//! boundary into [`fulcrum_core::EngineError`] (per the DAG-shaped
//! error hierarchy convention documented there).

use thiserror::Error;

/// Errors from one `ReactEngine::execute` call.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ReactError {
    /// The LLM call failed (transport error, non-retryable model
    /// error, or a retryable error that exhausted its retries).
    #[error("llm call failed: {0}")]
    LlmFailure(String),

    /// A tool call named a tool the registry doesn't know.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A tool call exceeded its configured timeout.
    #[error("tool timed out: {tool} after {elapsed_ms}ms")]
    ToolTimeout {
        /// Name of the tool that timed out.
        tool: String,
        /// How long it ran before being cancelled.
        elapsed_ms: u64,
    },

    /// A tool call executed but returned an error.
    #[error("tool execution failed: {tool}: {message}")]
    ToolExecution {
        /// Name of the tool that failed.
        tool: String,
        /// Error message from the tool.
        message: String,
    },

    /// The model's function-call payload could not be parsed.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The run's cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// An attachment placeholder could not be resolved.
    #[error("attachment resolution failed: {0}")]
    AttachmentResolution(String),

    /// Catch-all for errors from out-of-scope collaborators (state
    /// store, memory service) that don't map onto a named kind above.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<fulcrum_provider::ProviderError> for ReactError {
    fn from(err: fulcrum_provider::ProviderError) -> Self {
        ReactError::LlmFailure(err.to_string())
    }
}

impl From<fulcrum_tool::ToolError> for ReactError {
    fn from(err: fulcrum_tool::ToolError) -> Self {
        match err {
            fulcrum_tool::ToolError::NotFound(name) => ReactError::ToolNotFound(name),
            fulcrum_tool::ToolError::Timeout { tool, elapsed_ms } => {
                ReactError::ToolTimeout { tool, elapsed_ms }
            }
            fulcrum_tool::ToolError::ExecutionFailed(msg) => ReactError::ToolExecution {
                tool: String::new(),
                message: msg,
            },
            fulcrum_tool::ToolError::InvalidInput(msg) => ReactError::ToolExecution {
                tool: String::new(),
                message: msg,
            },
            fulcrum_tool::ToolError::Other(err) => ReactError::Other(err),
        }
    }
}

impl From<fulcrum_proto::StateError> for ReactError {
    fn from(err: fulcrum_proto::StateError) -> Self {
        ReactError::Other(Box::new(err))
    }
}

impl From<ReactError> for fulcrum_core::EngineError {
    fn from(err: ReactError) -> Self {
        match err {
            ReactError::LlmFailure(msg) => fulcrum_core::EngineError::LlmFailure(msg),
            ReactError::ToolNotFound(name) => fulcrum_core::EngineError::ToolNotFound(name),
            ReactError::ToolTimeout { tool, elapsed_ms } => {
                fulcrum_core::EngineError::ToolTimeout { tool, elapsed_ms }
            }
            ReactError::ToolExecution { tool, message } => {
                fulcrum_core::EngineError::ToolExecution { tool, message }
            }
            ReactError::ParseError(msg) => fulcrum_core::EngineError::ParseError(msg),
            ReactError::Cancelled => fulcrum_core::EngineError::Cancelled,
            ReactError::AttachmentResolution(msg) => {
                fulcrum_core::EngineError::AttachmentResolution(msg)
            }
            ReactError::Other(err) => fulcrum_core::EngineError::Other(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_timeout_maps_through() {
        let err = ReactError::from(fulcrum_tool::ToolError::Timeout {
            tool: "bash".into(),
            elapsed_ms: 30_000,
        });
        assert!(matches!(err, ReactError::ToolTimeout { .. }));
        let engine_err: fulcrum_core::EngineError = err.into();
        assert!(engine_err.to_string().contains("bash"));
    }

    #[test]
    fn provider_error_becomes_llm_failure() {
        let err: ReactError = fulcrum_provider::ProviderError::RateLimited.into();
        assert!(matches!(err, ReactError::LlmFailure(_)));
    }
}

//! `EngineError` — the closed set of error kinds named in §7, shared
//! across every crate that drives or observes a run.
//!
//! Each component crate (`fulcrum-workflow`, `fulcrum-events`,
//! `fulcrum-background`, `fulcrum-scheduler`, `fulcrum-budget`,
//! `fulcrum-config`) defines its own narrower error enum for the
//! failures it can produce internally, then provides a `From` impl
//! converting into this one. That conversion is written in the
//! downstream crate (not here) so `fulcrum-core` never needs to depend
//! on anything built on top of it — the dependency graph stays a DAG
//! rooted at `fulcrum-proto`/`fulcrum-core`.

use thiserror::Error;

/// Top-level error kinds produced by the agent execution engine (§7).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The LLM client failed (transport error, non-retryable model
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

    /// A plan/clarify/request_user gate was violated. Per §7 this is
    /// handled internally as an injected correction message and a
    /// re-prompt, never surfaced as a returned error — this variant
    /// exists so components that log gate violations have a shared
    /// type to log, not because `ExecuteTask` ever returns it.
    #[error("gate violation: {0}")]
    GateViolation(String),

    /// The run's cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// A session or per-run budget limit was exceeded.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// `BackgroundTaskManager::dispatch` was called with an ID already
    /// in use.
    #[error("background task ID already in use: {0}")]
    BackgroundDuplicate(String),

    /// A background task named an agent-type tag with no registered
    /// external executor.
    #[error("no executor registered for agent type: {0}")]
    BackgroundMissingExecutor(String),

    /// Writing a job to the job store failed.
    #[error("job persistence failed: {job}: {message}")]
    JobPersist {
        /// Job name.
        job: String,
        /// Error message from the store.
        message: String,
    },

    /// `EnsureSession` was asked to load a session ID the store has
    /// never seen.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// An attachment placeholder could not be resolved.
    #[error("attachment resolution failed: {0}")]
    AttachmentResolution(String),

    /// Catch-all, for errors from out-of-scope collaborators (§1) that
    /// don't map onto a named kind above.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_timeout_renders_tool_and_duration() {
        let err = EngineError::ToolTimeout {
            tool: "file_read".into(),
            elapsed_ms: 5000,
        };
        assert_eq!(err.to_string(), "tool timed out: file_read after 5000ms");
    }

    #[test]
    fn other_variant_wraps_boxed_error() {
        let boxed: Box<dyn std::error::Error + Send + Sync> = "oops".into();
        let err: EngineError = boxed.into();
        assert_eq!(err.to_string(), "oops");
    }
}

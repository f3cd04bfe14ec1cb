#![deny(missing_docs)]
//! Object-safe tool trait and registry for the agent execution engine.
//!
//! Any tool source (local function, MCP bridge, HTTP endpoint) implements
//! [`ToolDyn`]. The ReAct runtime looks tools up by name through a
//! [`ToolRegistry`] and never depends on a concrete tool implementation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors from tool lookup and execution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool was not found in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool execution exceeded its allotted timeout.
    #[error("tool {tool} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Name of the tool that timed out.
        tool: String,
        /// Wall-clock time elapsed before the timeout fired.
        elapsed_ms: u64,
    },

    /// The input provided to the tool was invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Object-safe trait for tool implementations.
///
/// Any tool source (local function, MCP bridge, HTTP endpoint) implements
/// this trait. Tools are stored as `Arc<dyn ToolDyn>` in [`ToolRegistry`].
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>;
}

/// Registry of tools available to a run.
///
/// Holds tools as `Arc<dyn ToolDyn>` keyed by name. The ReAct runtime uses
/// this to look up and execute tools requested by the model.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name)
    }

    /// Iterate over all registered tools.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ToolDyn>> {
        self.tools.values()
    }

    /// JSON Schema summaries for every registered tool, in an arbitrary but
    /// stable-within-a-call order. Used to build the provider's tool list.
    pub fn schemas(&self) -> Vec<ToolSchemaSummary> {
        self.tools
            .values()
            .map(|t| ToolSchemaSummary {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Flattened tool description handed to a provider when building a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchemaSummary {
    /// The tool's unique name.
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
}

/// Per-tool execution timeout policy.
///
/// The ReAct runtime consults this before executing each accepted tool
/// call; an entry absent from `overrides` falls back to `default`.
#[derive(Debug, Clone)]
pub struct ToolTimeoutPolicy {
    default: Duration,
    overrides: HashMap<String, Duration>,
}

impl ToolTimeoutPolicy {
    /// Create a policy with the given default timeout and no overrides.
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Set a per-tool override, replacing any existing one for that name.
    pub fn with_override(mut self, tool: impl Into<String>, timeout: Duration) -> Self {
        self.overrides.insert(tool.into(), timeout);
        self
    }

    /// Resolve the timeout that applies to `tool`.
    pub fn timeout_for(&self, tool: &str) -> Duration {
        self.overrides.get(tool).copied().unwrap_or(self.default)
    }
}

impl Default for ToolTimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn tool_dyn_is_object_safe() {
        _assert_send_sync::<Arc<dyn ToolDyn>>();
    }

    #[test]
    fn tool_error_display() {
        assert_eq!(
            ToolError::NotFound("bash".into()).to_string(),
            "tool not found: bash"
        );
        assert_eq!(
            ToolError::Timeout {
                tool: "bash".into(),
                elapsed_ms: 5000
            }
            .to_string(),
            "tool bash timed out after 5000ms"
        );
    }

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input back"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>
        {
            Box::pin(async move { Ok(json!({"echoed": input})) })
        }
    }

    struct FailTool;

    impl ToolDyn for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            _input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>
        {
            Box::pin(async { Err(ToolError::ExecutionFailed("always fails".into())) })
        }
    }

    #[test]
    fn registry_add_and_get() {
        let mut reg = ToolRegistry::new();
        assert!(reg.is_empty());

        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nonexistent").is_none());
    }

    #[test]
    fn registry_schemas() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(FailTool));

        let schemas = reg.schemas();
        assert_eq!(schemas.len(), 2);
        assert!(schemas.iter().any(|s| s.name == "echo"));
    }

    #[tokio::test]
    async fn registry_call_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));

        let tool = reg.get("echo").unwrap();
        let result = tool.call(json!({"msg": "hello"})).await.unwrap();
        assert_eq!(result, json!({"echoed": {"msg": "hello"}}));
    }

    #[tokio::test]
    async fn registry_call_failing_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));

        let tool = reg.get("fail").unwrap();
        let result = tool.call(json!({})).await;
        assert!(result.is_err());
    }

    #[test]
    fn registry_overwrite() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);

        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn timeout_policy_falls_back_to_default() {
        let policy = ToolTimeoutPolicy::new(Duration::from_secs(10))
            .with_override("slow_tool", Duration::from_secs(120));

        assert_eq!(policy.timeout_for("slow_tool"), Duration::from_secs(120));
        assert_eq!(policy.timeout_for("echo"), Duration::from_secs(10));
    }
}

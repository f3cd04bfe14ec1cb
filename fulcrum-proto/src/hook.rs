//! The Hook interface — observation and intervention in the coordinator's
//! and runtime's inner loops.
//!
//! Hooks are how pre-task proactive hooks (§4.6 step 5) and the
//! per-iteration hook (§4.6 step 6) are wired without the coordinator or
//! the ReAct runtime knowing who is listening.

use crate::error::HookError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where in the coordinator's or the ReAct runtime's loop a hook fires.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Before the ReAct runtime is invoked, once per root-level run.
    PreTask,
    /// At the start of each iteration, before `think`.
    IterationStart,
    /// Before each tool is executed.
    PreToolUse,
    /// After each tool completes, before the result enters `observe`.
    PostToolUse,
    /// At each exit-condition check in `finish`.
    ExitCheck,
}

/// Read-only context available to a hook at its firing point. Hooks
/// observe and decide; mutation happens via [`HookAction`].
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    /// Current hook point.
    pub point: HookPoint,
    /// Current tool being called (only at Pre/PostToolUse).
    pub tool_name: Option<String>,
    /// Tool input (only at PreToolUse).
    pub tool_input: Option<serde_json::Value>,
    /// Tool result (only at PostToolUse).
    pub tool_result: Option<String>,
    /// Most recent assistant content (only at IterationStart/ExitCheck).
    pub model_output: Option<String>,
    /// Running count of tokens used this run.
    pub tokens_used: u64,
    /// Running cost in USD this run.
    pub cost: rust_decimal::Decimal,
    /// Number of iterations completed so far.
    pub iterations_completed: u32,
    /// Time elapsed since the run started.
    pub elapsed: crate::duration::DurationMs,
}

impl HookContext {
    /// Create a new HookContext with only the hook point set.
    pub fn new(point: HookPoint) -> Self {
        Self {
            point,
            tool_name: None,
            tool_input: None,
            tool_result: None,
            model_output: None,
            tokens_used: 0,
            cost: rust_decimal::Decimal::ZERO,
            iterations_completed: 0,
            elapsed: crate::duration::DurationMs::ZERO,
        }
    }
}

/// What a hook decides to do.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookAction {
    /// Continue normally.
    Continue,
    /// Halt the run. The runtime finalizes with stop reason `error`.
    Halt {
        /// Reason for halting.
        reason: String,
    },
    /// Skip this tool call (only valid at PreToolUse). A synthetic
    /// "skipped by policy" result is backfilled.
    SkipTool {
        /// Reason for skipping.
        reason: String,
    },
    /// Modify the tool input before execution (only at PreToolUse).
    ModifyToolInput {
        /// The replacement tool input.
        new_input: serde_json::Value,
    },
    /// Replace the tool output with a modified version (only at PostToolUse).
    ModifyToolOutput {
        /// The replacement output.
        new_output: serde_json::Value,
    },
    /// Inject a system message into the run's message log (only at
    /// PreTask or IterationStart).
    InjectMessage {
        /// Message content to inject.
        content: String,
    },
}

/// A hook that can observe and intervene in the coordinator's and the
/// ReAct runtime's loops.
///
/// Hooks are registered externally and called at their declared points;
/// neither the coordinator nor the runtime knows who is watching.
/// Implementations SHOULD complete quickly — a hook that calls a model
/// on every tool use adds latency to every tool call; that cost is the
/// hook author's responsibility.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Which points this hook fires at.
    fn points(&self) -> &[HookPoint];

    /// Called at each registered hook point. Returning an error does not
    /// halt the run — it is logged and treated as `HookAction::Continue`.
    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHook {
        points: Vec<HookPoint>,
    }

    #[async_trait]
    impl Hook for NoopHook {
        fn points(&self) -> &[HookPoint] {
            &self.points
        }

        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            Ok(HookAction::Continue)
        }
    }

    #[tokio::test]
    async fn hook_is_object_safe_and_callable() {
        let hook: std::sync::Arc<dyn Hook> = std::sync::Arc::new(NoopHook {
            points: vec![HookPoint::IterationStart],
        });
        assert_eq!(hook.points(), &[HookPoint::IterationStart]);
        let ctx = HookContext::new(HookPoint::IterationStart);
        let action = hook.on_event(&ctx).await.unwrap();
        assert!(matches!(action, HookAction::Continue));
    }

    #[test]
    fn hook_action_serializes_with_tag() {
        let action = HookAction::Halt {
            reason: "budget".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "halt");
        assert_eq!(json["reason"], "budget");
    }
}

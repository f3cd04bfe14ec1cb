//! Plan/clarify/request_user gate enforcement (§4.5 "Plan gate").
//!
//! Evaluated before any tool call in an iteration is dispatched. A
//! violation produces a corrective system message and causes the
//! runtime to skip tool execution for that iteration entirely — no
//! state counters advance, per spec.

use std::collections::HashSet;

use fulcrum_core::{TaskState, ToolCall};

const PLAN_TOOL: &str = "plan";
const CLARIFY_TOOL: &str = "clarify";
const REQUEST_USER_TOOL: &str = "request_user";

/// Task identifier used when a plan document declares no explicit
/// `tasks` array — the whole plan is then treated as a single task for
/// gate (4) purposes, matching the historical single-clarify-required
/// behavior for simple-shaped complex plans.
const DEFAULT_TASK_ID: &str = "__default__";

fn gate_message(rule: &str) -> String {
    format!("系统提示：本轮工具调用违反了执行顺序规则（{rule}），请重新规划后再继续。")
}

fn plan_is_complex(document: &serde_json::Value) -> bool {
    document
        .get("complexity")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case("complex"))
        .unwrap_or(false)
}

/// Pull a task's identifier out of one entry of a plan document's
/// `tasks` array: either the entry itself (a bare string) or its `id`/
/// `task_id` field.
fn task_identifier(value: &serde_json::Value, index: usize) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(_) => value
            .get("id")
            .or_else(|| value.get("task_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| index.to_string()),
        _ => index.to_string(),
    }
}

/// The distinct task identifiers a plan document declares, from its
/// `tasks` array. A plan with no `tasks` array (or an empty one) is
/// treated as declaring one implicit task.
fn plan_task_ids(document: &serde_json::Value) -> Vec<String> {
    match document.get("tasks").and_then(|v| v.as_array()) {
        Some(tasks) if !tasks.is_empty() => tasks
            .iter()
            .enumerate()
            .map(|(i, t)| task_identifier(t, i))
            .collect(),
        _ => vec![DEFAULT_TASK_ID.to_string()],
    }
}

/// The task a `clarify` call targeted, from its `task_id`/`task`
/// argument. Falls back to the implicit default task when the call
/// carries no target, so a plan with no declared `tasks` array keeps
/// working with a single untargeted `clarify`.
fn clarify_target(arguments: &serde_json::Value) -> String {
    arguments
        .get("task_id")
        .or_else(|| arguments.get("task"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_TASK_ID.to_string())
}

/// Check the gates against one iteration's proposed tool calls. Returns
/// the corrective Mandarin message to inject if a gate was violated,
/// `None` if the calls may proceed.
pub fn check_gates(tool_calls: &[ToolCall], state: &TaskState) -> Option<String> {
    if tool_calls.is_empty() {
        return None;
    }

    let has_plan = tool_calls.iter().any(|c| c.name == PLAN_TOOL);
    let has_clarify = tool_calls.iter().any(|c| c.name == CLARIFY_TOOL);
    let has_request_user = tool_calls.iter().any(|c| c.name == REQUEST_USER_TOOL);

    if has_plan && tool_calls.len() > 1 {
        return Some(gate_message(
            "plan 必须是本轮唯一的工具调用，且须先于任何操作类工具",
        ));
    }

    if has_clarify {
        if tool_calls.len() > 1 {
            return Some(gate_message("clarify 必须是本轮唯一的工具调用"));
        }
        if state.plans.is_empty() {
            return Some(gate_message("clarify 必须跟在 plan 之后"));
        }
    }

    if has_request_user {
        if tool_calls.len() > 1 {
            return Some(gate_message("request_user 必须是本轮唯一的工具调用"));
        }
        if state.plans.is_empty() {
            return Some(gate_message("request_user 必须跟在 plan 之后"));
        }
    }

    if !has_plan && !has_clarify && !has_request_user {
        if let Some(plan) = state.latest_plan() {
            if plan_is_complex(&plan.document) {
                let required = plan_task_ids(&plan.document);
                let clarified: HashSet<String> = state
                    .tool_results
                    .iter()
                    .filter(|r| r.tool_name == CLARIFY_TOOL && r.iteration >= plan.iteration)
                    .map(|r| clarify_target(&r.arguments))
                    .collect();
                let all_clarified = required.iter().all(|task| clarified.contains(task));
                if !all_clarified {
                    return Some(gate_message(
                        "复杂任务在执行操作类工具前，每个独立任务都必须先有对应的 clarify",
                    ));
                }
            }
        }
    }

    None
}

/// Whether a plan has been (re)declared since the last plan review and
/// its complexity is `complex` — the trigger for plan review pause
/// (§4.5 "Plan review").
pub fn needs_plan_review(state: &TaskState, last_reviewed_iteration: Option<u32>) -> bool {
    match state.latest_plan() {
        Some(plan) => {
            plan_is_complex(&plan.document)
                && last_reviewed_iteration.map(|i| i < plan.iteration).unwrap_or(true)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::PlanEntry;
    use fulcrum_proto::{RunId, SessionId};
    use serde_json::json;

    fn state() -> TaskState {
        TaskState::new(SessionId::new("s-1"), RunId::new("r-1"), None)
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("tu-{name}"),
            name: name.into(),
            input: json!({}),
        }
    }

    #[test]
    fn plan_must_be_solitary() {
        let state = state();
        let calls = vec![call("plan"), call("file_read")];
        assert!(check_gates(&calls, &state).is_some());
    }

    #[test]
    fn action_tool_without_plan_is_allowed_when_no_plan_declared() {
        let state = state();
        let calls = vec![call("file_read")];
        assert!(check_gates(&calls, &state).is_none());
    }

    #[test]
    fn clarify_requires_prior_plan() {
        let state = state();
        let calls = vec![call("clarify")];
        assert!(check_gates(&calls, &state).is_some());
    }

    #[test]
    fn clarify_allowed_after_plan() {
        let mut state = state();
        state.plans.push(PlanEntry {
            iteration: 1,
            document: json!({"complexity": "simple"}),
        });
        let calls = vec![call("clarify")];
        assert!(check_gates(&calls, &state).is_none());
    }

    #[test]
    fn complex_plan_requires_clarify_before_action_tool() {
        let mut state = state();
        state.plans.push(PlanEntry {
            iteration: 1,
            document: json!({"complexity": "complex"}),
        });
        let calls = vec![call("file_read")];
        assert!(check_gates(&calls, &state).is_some());
    }

    #[test]
    fn complex_plan_allows_action_tool_after_clarify() {
        let mut state = state();
        state.plans.push(PlanEntry {
            iteration: 1,
            document: json!({"complexity": "complex"}),
        });
        state.tool_results.push(fulcrum_core::ToolResultRecord {
            iteration: 2,
            tool_name: "clarify".into(),
            arguments: json!({}),
            output: "ok".into(),
            is_error: false,
        });
        let calls = vec![call("file_read")];
        assert!(check_gates(&calls, &state).is_none());
    }

    #[test]
    fn complex_plan_with_two_tasks_requires_clarify_per_task() {
        let mut state = state();
        state.plans.push(PlanEntry {
            iteration: 1,
            document: json!({
                "complexity": "complex",
                "tasks": [{"id": "t1"}, {"id": "t2"}],
            }),
        });
        state.tool_results.push(fulcrum_core::ToolResultRecord {
            iteration: 2,
            tool_name: "clarify".into(),
            arguments: json!({"task_id": "t1"}),
            output: "ok".into(),
            is_error: false,
        });
        let calls = vec![call("file_read")];
        // Only t1 was clarified; t2 still lacks its own clarify.
        assert!(check_gates(&calls, &state).is_some());
    }

    #[test]
    fn complex_plan_with_two_tasks_allows_action_once_both_clarified() {
        let mut state = state();
        state.plans.push(PlanEntry {
            iteration: 1,
            document: json!({
                "complexity": "complex",
                "tasks": [{"id": "t1"}, {"id": "t2"}],
            }),
        });
        state.tool_results.push(fulcrum_core::ToolResultRecord {
            iteration: 2,
            tool_name: "clarify".into(),
            arguments: json!({"task_id": "t1"}),
            output: "ok".into(),
            is_error: false,
        });
        state.tool_results.push(fulcrum_core::ToolResultRecord {
            iteration: 3,
            tool_name: "clarify".into(),
            arguments: json!({"task_id": "t2"}),
            output: "ok".into(),
            is_error: false,
        });
        let calls = vec![call("file_read")];
        assert!(check_gates(&calls, &state).is_none());
    }

    #[test]
    fn plan_review_triggers_on_fresh_complex_plan() {
        let mut state = state();
        state.plans.push(PlanEntry {
            iteration: 1,
            document: json!({"complexity": "complex"}),
        });
        assert!(needs_plan_review(&state, None));
        assert!(!needs_plan_review(&state, Some(1)));
    }
}

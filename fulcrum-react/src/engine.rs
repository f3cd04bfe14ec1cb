//! `ReactEngine` (C5): the Think -> Plan gate -> Plan review -> Execute
//! -> Observe -> Memory refresh -> Finish loop (§4.5).
//!
//! Generalizes the turn-at-a-time shape of a classic tool-using
//! operator loop (resolve config, assemble context, loop { think,
//! gate, execute, observe, check limits, compact }) into the richer
//! state machine this spec layers on top of it: a plan/clarify gate
//! ahead of every tool dispatch, a pause-for-review path for complex
//! plans, attachment-placeholder expansion, argument-history
//! compaction, proactive memory refresh, and background-task
//! completion draining at each iteration boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tracing::warn;

use fulcrum_background::BackgroundTaskManager;
use fulcrum_context::ContextStrategy;
use fulcrum_core::{
    Attachment, EventBody, FeedbackSignal, ImportantNote, Message, MessageRole, MessageSource,
    PlanEntry, StopReason, TaskResult, TaskState, ToolCall, ToolResultPayload, ToolResultRecord,
};
use fulcrum_hooks::HookRegistry;
use fulcrum_proto::{BackgroundTaskId, DurationMs, HookAction, HookContext, HookPoint};
use fulcrum_tool::{ToolError, ToolRegistry, ToolTimeoutPolicy};
use fulcrum_workflow::{SharedWorkflowEmitter, SharedWorkflowTracker};

use fulcrum_provider::{
    ContentPart, Provider, ProviderMessage, ProviderRequest, Role, StreamEvent, ToolSchema,
};

use crate::attachments::{expand_string, expand_tool_input};
use crate::compaction::compact_arguments;
use crate::config::{ReactConfig, ResolvedConfig, RunOverrides};
use crate::error::ReactError;
use crate::gates::{check_gates, needs_plan_review};
use crate::memory::{extract_keywords, should_refresh, MemoryService};

/// Leaked templating artifacts a parsed tool-call name must not contain
/// before it's accepted for execution (§4.5 Execute).
const LEAKED_MARKERS: &[&str] = &["<|", "functions.", "user<"];

/// The message the runtime pushes in place of an unreachable extra
/// think call's answer when the iteration cap is exceeded (§7: "max
/// iterations ... followed by one extra LLM call requesting a final
/// answer").
const MAX_ITERATIONS_NUDGE: &str =
    "已达到最大轮次，请基于现有信息直接给出最终答案，不要再调用工具。";

/// The Think/Plan/Execute/Observe/Finish runtime for one agent run.
///
/// One `ReactEngine` is built per session-level configuration (model,
/// tools, hooks) and reused across many `execute` calls; the
/// per-run collaborators — the task state it mutates, the workflow
/// tracker it reports into, and the cancellation token it observes —
/// are passed to `execute` itself rather than held here, since a
/// single engine instance drives many independent runs over its
/// lifetime.
pub struct ReactEngine {
    config: ReactConfig,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    tool_timeouts: Arc<ToolTimeoutPolicy>,
    context_strategy: Arc<dyn ContextStrategy>,
    hooks: Arc<HookRegistry>,
    memory: Option<Arc<dyn MemoryService>>,
    background: Option<Arc<BackgroundTaskManager>>,
}

impl ReactEngine {
    /// Build an engine from its static collaborators. Memory refresh
    /// and background-task draining are both optional capabilities,
    /// attached with [`Self::with_memory`] and [`Self::with_background`].
    pub fn new(
        config: ReactConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        tool_timeouts: ToolTimeoutPolicy,
        context_strategy: Arc<dyn ContextStrategy>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            config,
            provider,
            tools,
            tool_timeouts: Arc::new(tool_timeouts),
            context_strategy,
            hooks,
            memory: None,
            background: None,
        }
    }

    /// Attach a memory service, enabling the periodic proactive refresh
    /// pass (§4.5 "Memory refresh").
    pub fn with_memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach a background-task manager, enabling completion draining
    /// at each iteration boundary (§5d).
    pub fn with_background(mut self, background: Arc<BackgroundTaskManager>) -> Self {
        self.background = Some(background);
        self
    }

    /// Run the ReAct loop to completion for one invocation.
    ///
    /// `state` is the single-owner mutable state for this run (§5);
    /// nothing outside this call touches it concurrently. `tracker`
    /// and `emitter` are the two capability handles onto this run's
    /// workflow graph, constructed once per run by the caller (§9: the
    /// tracker never holds a reference back into this loop).
    pub async fn execute(
        &self,
        state: &mut TaskState,
        tracker: SharedWorkflowTracker,
        emitter: SharedWorkflowEmitter,
        overrides: RunOverrides,
        cancel: fulcrum_proto::CancellationToken,
    ) -> Result<TaskResult, ReactError> {
        let resolved = self.config.resolve(&overrides);
        let start = Instant::now();
        let concurrency = Arc::new(Semaphore::new(self.config.tool_concurrency_limit.max(1)));

        tracker.ensure_node("react:context", None).await;
        tracker.start_node("react:context").await;
        tracker
            .complete_success(
                "react:context",
                Some(serde_json::json!({"messages": state.messages.len()})),
            )
            .await;

        let mut last_reviewed_iteration: Option<u32> = None;
        let mut turn: u32 = 0;
        let mut total_input: u64 = 0;
        let mut total_output: u64 = 0;
        let mut total_cost = Decimal::ZERO;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if let Some(max_duration) = resolved.max_duration {
                if start.elapsed() > max_duration {
                    break StopReason::MaxIterations;
                }
            }

            turn += 1;
            if turn > resolved.max_iterations {
                state.messages.push(Message::new(
                    MessageRole::System,
                    MAX_ITERATIONS_NUDGE,
                    MessageSource::Proactive,
                ));
                if let Ok(outcome) = self
                    .think(state, &tracker, &emitter, &resolved, turn, cancel.clone())
                    .await
                {
                    total_input += outcome.usage.input_tokens;
                    total_output += outcome.usage.output_tokens;
                    if let Some(cost) = outcome.cost {
                        total_cost += cost;
                    }
                }
                break StopReason::MaxIterations;
            }

            if let Some(background) = self.background.clone() {
                for id in background.drain_completions().await {
                    self.inject_background_completion(state, &emitter, &background, &id)
                        .await;
                }
            }

            let mut iteration_ctx = HookContext::new(HookPoint::IterationStart);
            iteration_ctx.iterations_completed = state.iteration;
            iteration_ctx.tokens_used = total_input + total_output;
            iteration_ctx.cost = total_cost;
            iteration_ctx.elapsed = DurationMs::from(start.elapsed());
            match self.hooks.dispatch(&iteration_ctx).await {
                HookAction::Halt { .. } => break StopReason::Error,
                HookAction::InjectMessage { content } => {
                    state
                        .messages
                        .push(Message::new(MessageRole::System, content, MessageSource::Proactive));
                }
                _ => {}
            }

            let think_outcome = match self
                .think(state, &tracker, &emitter, &resolved, turn, cancel.clone())
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    let node_id = format!("react:iter:{turn}:think");
                    tracker.complete_failure(&node_id, err.to_string()).await;
                    break StopReason::Error;
                }
            };
            total_input += think_outcome.usage.input_tokens;
            total_output += think_outcome.usage.output_tokens;
            if let Some(cost) = think_outcome.cost {
                total_cost += cost;
            }

            if think_outcome.tool_calls.is_empty() {
                state.iteration += 1;
                break StopReason::FinalAnswer;
            }

            let plan_node = format!("react:iter:{turn}:plan");
            tracker.ensure_node(&plan_node, None).await;
            tracker.start_node(&plan_node).await;

            if let Some(correction) = check_gates(&think_outcome.tool_calls, state) {
                tracker.complete_failure(&plan_node, correction.clone()).await;
                state.messages.push(Message::new(
                    MessageRole::System,
                    correction,
                    MessageSource::Proactive,
                ));
                continue;
            }
            tracker.complete_success(&plan_node, None).await;

            state.iteration += 1;

            if needs_plan_review(state, last_reviewed_iteration) {
                let plan = state
                    .latest_plan()
                    .expect("needs_plan_review only returns true when a plan exists")
                    .clone();
                last_reviewed_iteration = Some(plan.iteration);
                let marker = format!(
                    "<plan_review_pending>\n{}\n</plan_review_pending>",
                    serde_json::json!({"plan": plan.document})
                );
                state.messages.push(Message::new(
                    MessageRole::System,
                    marker,
                    MessageSource::Proactive,
                ));
                break StopReason::AwaitUserInput;
            }

            self.execute_tools(
                state,
                &tracker,
                &emitter,
                &think_outcome.tool_calls,
                &concurrency,
                turn,
                &resolved,
                cancel.clone(),
            )
            .await;

            self.observe(state, &resolved, turn);

            if should_refresh(
                resolved.memory_refresh_enabled,
                state.iteration,
                resolved.memory_refresh_interval,
                &resolved.user_id,
            ) {
                self.refresh_memory(state, &emitter, &resolved).await;
            }

            if let Some(max_cost) = resolved.max_cost {
                if total_cost > max_cost {
                    break StopReason::MaxIterations;
                }
            }
        };

        let stop_reason = self.run_exit_check(stop_reason, state, &resolved, total_input + total_output, total_cost, start.elapsed()).await;

        self.finish(
            state,
            &tracker,
            &emitter,
            stop_reason,
            start.elapsed(),
            (total_input, total_output),
        )
        .await
    }

    async fn run_exit_check(
        &self,
        stop_reason: StopReason,
        state: &TaskState,
        _resolved: &ResolvedConfig,
        tokens_used: u64,
        cost: Decimal,
        elapsed: Duration,
    ) -> StopReason {
        let mut ctx = HookContext::new(HookPoint::ExitCheck);
        ctx.iterations_completed = state.iteration;
        ctx.tokens_used = tokens_used;
        ctx.cost = cost;
        ctx.elapsed = DurationMs::from(elapsed);
        match self.hooks.dispatch(&ctx).await {
            HookAction::Halt { .. } => StopReason::Error,
            _ => stop_reason,
        }
    }

    async fn think(
        &self,
        state: &mut TaskState,
        tracker: &SharedWorkflowTracker,
        emitter: &SharedWorkflowEmitter,
        resolved: &ResolvedConfig,
        turn: u32,
        cancel: fulcrum_proto::CancellationToken,
    ) -> Result<ThinkOutcome, ReactError> {
        let node_id = format!("react:iter:{turn}:think");
        tracker.ensure_node(&node_id, None).await;
        tracker.start_node(&node_id).await;
        emitter
            .emit_event(EventBody::NodeOutputDelta {
                node_id: node_id.clone(),
                delta: format!("{} messages in context", state.messages.len()),
                is_final: false,
            })
            .await;

        let visible: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.source.is_llm_visible())
            .collect();
        let provider_messages = to_provider_messages(&visible);
        let provider_messages = if self
            .context_strategy
            .should_compact(&provider_messages, self.config.context_token_limit)
        {
            self.context_strategy.compact(provider_messages)
        } else {
            provider_messages
        };

        let request = ProviderRequest {
            model: resolved.model.clone(),
            messages: provider_messages,
            tools: self.build_tool_schemas(resolved),
            max_tokens: Some(resolved.max_tokens),
            temperature: None,
            system: Some(resolved.system.clone()),
            request_id: format!("{}:{node_id}", state.run_id),
            extra: serde_json::Value::Null,
        };

        let result = self.stream_think(&node_id, request, cancel, tracker, emitter).await;
        match &result {
            Ok(outcome) => {
                tracker
                    .complete_success(
                        &node_id,
                        Some(serde_json::json!({"tool_calls": outcome.tool_calls.len()})),
                    )
                    .await;
                if !outcome.reply.is_empty_reply() {
                    state.messages.push(outcome.reply.clone());
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn stream_think(
        &self,
        node_id: &str,
        request: ProviderRequest,
        cancel: fulcrum_proto::CancellationToken,
        tracker: &SharedWorkflowTracker,
        emitter: &SharedWorkflowEmitter,
    ) -> Result<ThinkOutcome, ReactError> {
        let mut stream = self.provider.complete_stream(request, cancel).await?;

        let mut text = String::new();
        let mut thinking = String::new();
        let mut tool_order: Vec<String> = Vec::new();
        let mut tool_names: HashMap<String, String> = HashMap::new();
        let mut tool_inputs: HashMap<String, String> = HashMap::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = fulcrum_provider::TokenUsage::default();
        let mut cost = None;

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta(delta) => {
                    emitter
                        .emit_event(EventBody::NodeOutputDelta {
                            node_id: node_id.to_string(),
                            delta: delta.clone(),
                            is_final: false,
                        })
                        .await;
                    text.push_str(&delta);
                }
                StreamEvent::ThinkingDelta(delta) => thinking.push_str(&delta),
                StreamEvent::ToolUseStart { id, name } => {
                    tool_order.push(id.clone());
                    tool_names.insert(id.clone(), name);
                    tool_inputs.insert(id, String::new());
                }
                StreamEvent::ToolUseInputDelta { id, delta } => {
                    tool_inputs.entry(id).or_default().push_str(&delta);
                }
                StreamEvent::ToolUseEnd { id } => {
                    let name = tool_names.get(&id).cloned().unwrap_or_default();
                    let raw = tool_inputs.get(&id).cloned().unwrap_or_default();
                    let input = if raw.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null)
                    };
                    tool_calls.push(ToolCall { id, name, input });
                }
                StreamEvent::Usage(u) => usage = u,
                StreamEvent::MessageComplete(response) => {
                    usage = response.usage;
                    cost = response.cost;
                    if text.is_empty() {
                        for part in &response.content {
                            if let ContentPart::Text { text: t } = part {
                                text.push_str(t);
                            }
                        }
                    }
                    if tool_calls.is_empty() {
                        for part in &response.content {
                            if let ContentPart::ToolUse { id, name, input } = part {
                                tool_calls.push(ToolCall {
                                    id: id.clone(),
                                    name: name.clone(),
                                    input: input.clone(),
                                });
                            }
                        }
                    }
                    emitter
                        .emit_event(EventBody::NodeOutputDelta {
                            node_id: node_id.to_string(),
                            delta: String::new(),
                            is_final: true,
                        })
                        .await;
                    let mut metadata = HashMap::new();
                    if !thinking.is_empty() {
                        metadata.insert("thinking".to_string(), serde_json::Value::String(thinking));
                    }
                    let reply = Message {
                        role: MessageRole::Assistant,
                        content: text,
                        tool_calls: tool_calls.clone(),
                        tool_result: None,
                        source: MessageSource::AssistantReply,
                        attachments: Vec::new(),
                        metadata,
                    };
                    return Ok(ThinkOutcome {
                        reply,
                        tool_calls,
                        usage,
                        cost,
                    });
                }
                StreamEvent::Error(err) => {
                    tracker.complete_failure(node_id, err.message.clone()).await;
                    return Err(ReactError::LlmFailure(err.message));
                }
            }
        }

        Err(ReactError::LlmFailure(
            "provider stream ended without a MessageComplete event".to_string(),
        ))
    }

    fn build_tool_schemas(&self, resolved: &ResolvedConfig) -> Vec<ToolSchema> {
        self.tools
            .schemas()
            .into_iter()
            .filter(|schema| {
                resolved
                    .allowed_tools
                    .as_ref()
                    .map(|allowed| allowed.iter().any(|name| name == &schema.name))
                    .unwrap_or(true)
            })
            .map(|schema| ToolSchema {
                name: schema.name,
                description: schema.description,
                input_schema: schema.input_schema,
            })
            .collect()
    }

    async fn execute_tools(
        &self,
        state: &mut TaskState,
        tracker: &SharedWorkflowTracker,
        emitter: &SharedWorkflowEmitter,
        tool_calls: &[ToolCall],
        concurrency: &Arc<Semaphore>,
        turn: u32,
        resolved: &ResolvedConfig,
        cancel: fulcrum_proto::CancellationToken,
    ) {
        let aggregate_id = format!("react:iter:{turn}:tools");
        tracker.ensure_node(&aggregate_id, None).await;
        tracker.start_node(&aggregate_id).await;

        let allowed = resolved.allowed_tools.clone();
        let mut handles = Vec::new();
        let mut k = 0usize;
        for (original_index, call) in tool_calls.iter().enumerate() {
            if is_leaked_marker(&call.name) {
                continue;
            }
            k += 1;
            let node_id = format!("react:iter:{turn}:tool:{}:{k}", call.name);
            let input = expand_tool_input(&call.name, call.input.clone(), state);
            let not_permitted = allowed
                .as_ref()
                .map(|names| !names.iter().any(|n| n == &call.name))
                .unwrap_or(false);

            let tools = self.tools.clone();
            let timeouts = self.tool_timeouts.clone();
            let hooks = self.hooks.clone();
            let tracker = tracker.clone();
            let emitter = emitter.clone();
            let cancel = cancel.clone();
            let permit_source = concurrency.clone();
            let call_id = call.id.clone();
            let tool_name = call.name.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("tool concurrency semaphore is never closed");
                run_single_tool(
                    tools,
                    timeouts,
                    hooks,
                    tracker,
                    emitter,
                    node_id,
                    tool_name,
                    call_id,
                    input,
                    original_index,
                    not_permitted,
                    cancel,
                )
                .await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => warn!(error = %join_err, "tool task panicked"),
            }
        }
        outcomes.sort_by_key(|o| o.original_index);

        tracker
            .complete_success(&aggregate_id, Some(serde_json::json!({"count": outcomes.len()})))
            .await;

        for outcome in outcomes {
            self.merge_tool_outcome(state, outcome);
        }
    }

    fn merge_tool_outcome(&self, state: &mut TaskState, outcome: ToolOutcome) {
        let iteration = state.iteration;

        if outcome.tool_name == "plan" && !outcome.is_error {
            if let Some(document) = outcome.raw_output.clone() {
                state.plans.push(PlanEntry { iteration, document });
            }
        }

        if let Some(obj) = outcome.raw_output.as_ref().and_then(|v| v.as_object()) {
            if let Some(notes) = obj.get("important_notes").and_then(|v| v.as_array()) {
                for (i, note) in notes.iter().enumerate() {
                    let text = note
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| note.get("text").and_then(|v| v.as_str()).map(str::to_string))
                        .unwrap_or_default();
                    if text.is_empty() {
                        continue;
                    }
                    let id = note
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{}-{iteration}-{i}", outcome.tool_name));
                    state
                        .important_notes
                        .entry(id.clone())
                        .or_insert(ImportantNote { id, text, iteration });
                }
            }

            if let Some(attachments) = obj.get("attachments").and_then(|v| v.as_array()) {
                for raw in attachments {
                    if let Ok(attachment) = serde_json::from_value::<Attachment>(raw.clone()) {
                        state.register_attachment(attachment, iteration);
                    }
                }
            }
        }

        state.tool_results.push(ToolResultRecord {
            iteration,
            tool_name: outcome.tool_name.clone(),
            arguments: outcome.arguments,
            output: outcome.rendered_output.clone(),
            is_error: outcome.is_error,
        });

        state.messages.push(Message {
            role: MessageRole::Tool,
            content: outcome.rendered_output.clone(),
            tool_calls: Vec::new(),
            tool_result: Some(ToolResultPayload {
                tool_call_id: outcome.call_id,
                content: outcome.rendered_output,
                is_error: outcome.is_error,
            }),
            source: MessageSource::ToolResult,
            attachments: Vec::new(),
            metadata: HashMap::new(),
        });
    }

    fn observe(&self, state: &mut TaskState, resolved: &ResolvedConfig, _turn: u32) {
        let iteration = state.iteration;

        let summaries: Vec<serde_json::Value> = state
            .tool_results
            .iter()
            .filter(|r| r.iteration == iteration)
            .map(|r| {
                serde_json::json!({
                    "tool_name": r.tool_name,
                    "is_error": r.is_error,
                    "output_excerpt": excerpt(&r.output, 200),
                })
            })
            .collect();

        let signals: Vec<FeedbackSignal> = state
            .tool_results
            .iter()
            .filter(|r| r.iteration == iteration)
            .map(|r| FeedbackSignal {
                iteration,
                tool_name: r.tool_name.clone(),
                summary: excerpt(&r.output, 160),
            })
            .collect();
        for signal in signals {
            state.push_feedback_signal(signal);
        }

        if let Some(obj) = state.world_state.as_object_mut() {
            obj.insert("last_tool_results".into(), serde_json::Value::Array(summaries));
            obj.insert("last_iteration".into(), serde_json::json!(iteration));
            obj.insert(
                "last_updated_at".into(),
                serde_json::json!(chrono::Utc::now().to_rfc3339()),
            );
        }

        let threshold = self.config.compaction_threshold_bytes;
        for record in state.tool_results.iter_mut().filter(|r| r.iteration == iteration) {
            record.arguments = compact_arguments(record.arguments.clone(), threshold);
        }

        if distance_since_last_assistant_reply(state) > self.config.reminder_distance_chars {
            state.goal_reminder = Some(resolved.system.clone());
            state.plan_reminder = state.latest_plan().map(|p| p.document.to_string());
        }
    }

    async fn refresh_memory(
        &self,
        state: &mut TaskState,
        emitter: &SharedWorkflowEmitter,
        resolved: &ResolvedConfig,
    ) {
        let Some(memory) = &self.memory else {
            return;
        };
        let Some(user_id) = &resolved.user_id else {
            return;
        };
        let keywords = extract_keywords(&state.tool_results);
        if keywords.is_empty() {
            return;
        }
        match memory.query(user_id, &keywords).await {
            Ok(Some(context)) => {
                state.messages.push(Message::new(
                    MessageRole::System,
                    context.clone(),
                    MessageSource::Proactive,
                ));
                emitter
                    .emit_event(EventBody::ProactiveContextRefresh {
                        query: keywords.join(" "),
                        injected: context,
                    })
                    .await;
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "memory refresh query failed"),
        }
    }

    async fn inject_background_completion(
        &self,
        state: &mut TaskState,
        emitter: &SharedWorkflowEmitter,
        background: &BackgroundTaskManager,
        id: &BackgroundTaskId,
    ) {
        let Some(summary) = background.status(std::slice::from_ref(id)).await.into_iter().next()
        else {
            return;
        };
        let success = matches!(
            summary.status,
            fulcrum_core::BackgroundTaskStatus::Completed
        );
        let detail = summary.error.unwrap_or_else(|| "completed".to_string());
        let content = format!(
            "Background Task Completed: {id} ({})",
            if success { "success" } else { detail.as_str() }
        );
        state
            .messages
            .push(Message::new(MessageRole::User, content, MessageSource::Proactive));
        emitter
            .emit_event(EventBody::BackgroundTaskCompleted {
                task_id: id.clone(),
                success,
                summary: detail,
            })
            .await;
    }

    async fn finish(
        &self,
        state: &mut TaskState,
        tracker: &SharedWorkflowTracker,
        emitter: &SharedWorkflowEmitter,
        stop_reason: StopReason,
        elapsed: Duration,
        token_usage: (u64, u64),
    ) -> Result<TaskResult, ReactError> {
        let node_id = "react:finalize";
        tracker.ensure_node(node_id, None).await;
        tracker.start_node(node_id).await;

        if state.final_answer.is_none() {
            if let Some(last) = state
                .messages
                .iter()
                .rev()
                .find(|m| m.source == MessageSource::AssistantReply)
            {
                if !last.content.trim().is_empty() {
                    state.final_answer = Some(last.content.clone());
                }
            }
        }

        let mut answer = expand_string(&state.final_answer.clone().unwrap_or_default(), state);
        append_missing_attachments(&mut answer, state);
        state.final_answer = Some(answer.clone());

        self.stream_final_answer(emitter, &answer).await;

        if stop_reason == StopReason::Cancelled {
            emitter
                .emit_event(EventBody::ResultCancelled {
                    reason: Some("run cancelled".to_string()),
                })
                .await;
        }

        tracker
            .complete_success(node_id, Some(serde_json::json!({"stop_reason": stop_reason})))
            .await;
        let snapshot = tracker.snapshot().await;

        Ok(TaskResult {
            final_answer: state.final_answer.clone().unwrap_or_default(),
            messages: state.messages.clone(),
            iterations: state.iteration,
            token_usage,
            stop_reason,
            session_id: state.session_id.clone(),
            run_id: state.run_id.clone(),
            parent_run_id: state.parent_run_id.clone(),
            attachments: state.attachments.clone(),
            duration: DurationMs::from(elapsed),
            important_notes: state.important_notes.clone(),
            workflow: snapshot,
        })
    }

    async fn stream_final_answer(&self, emitter: &SharedWorkflowEmitter, answer: &str) {
        let chunk_chars = self.config.finalize_chunk_chars.max(1);
        let chars: Vec<char> = answer.chars().collect();
        if chars.is_empty() {
            emitter
                .emit_event(EventBody::ResultFinal {
                    content: String::new(),
                    stream_finished: true,
                })
                .await;
            return;
        }
        let mut offset = 0;
        while offset < chars.len() {
            let end = (offset + chunk_chars).min(chars.len());
            let chunk: String = chars[offset..end].iter().collect();
            emitter
                .emit_event(EventBody::ResultFinal {
                    content: chunk,
                    stream_finished: end == chars.len(),
                })
                .await;
            offset = end;
        }
    }
}

/// Per-call think result: the assistant message to fold into the log,
/// the tool calls the model requested, and the usage/cost this call
/// contributed.
struct ThinkOutcome {
    reply: Message,
    tool_calls: Vec<ToolCall>,
    usage: fulcrum_provider::TokenUsage,
    cost: Option<Decimal>,
}

/// One tool call's outcome, carried out of its spawned task back to
/// the caller for in-order merging (§5c: "results are appended in
/// call-definition order by re-indexing after completion").
struct ToolOutcome {
    original_index: usize,
    call_id: String,
    tool_name: String,
    arguments: serde_json::Value,
    rendered_output: String,
    raw_output: Option<serde_json::Value>,
    is_error: bool,
}

#[allow(clippy::too_many_arguments)]
async fn run_single_tool(
    tools: Arc<ToolRegistry>,
    timeouts: Arc<ToolTimeoutPolicy>,
    hooks: Arc<HookRegistry>,
    tracker: SharedWorkflowTracker,
    emitter: SharedWorkflowEmitter,
    node_id: String,
    tool_name: String,
    call_id: String,
    mut input: serde_json::Value,
    original_index: usize,
    not_permitted: bool,
    cancel: fulcrum_proto::CancellationToken,
) -> ToolOutcome {
    tracker.ensure_node(&node_id, Some(input.clone())).await;
    tracker.start_node(&node_id).await;
    emitter
        .emit_event(EventBody::ToolStarted {
            node_id: node_id.clone(),
            tool_name: tool_name.clone(),
            input: input.clone(),
        })
        .await;

    let call_result: Result<serde_json::Value, ToolError> = if not_permitted {
        Err(ToolError::InvalidInput(format!(
            "tool not permitted for this run: {tool_name}"
        )))
    } else {
        let mut pre_ctx = HookContext::new(HookPoint::PreToolUse);
        pre_ctx.tool_name = Some(tool_name.clone());
        pre_ctx.tool_input = Some(input.clone());
        match hooks.dispatch(&pre_ctx).await {
            HookAction::SkipTool { reason } => Err(ToolError::InvalidInput(format!(
                "skipped by policy: {reason}"
            ))),
            HookAction::Halt { reason } => {
                Err(ToolError::ExecutionFailed(format!("halted: {reason}")))
            }
            HookAction::ModifyToolInput { new_input } => {
                input = new_input;
                execute_with_timeout(&tools, &timeouts, &tool_name, input.clone(), cancel).await
            }
            _ => execute_with_timeout(&tools, &timeouts, &tool_name, input.clone(), cancel).await,
        }
    };

    let (mut is_error, raw_output) = match call_result {
        Ok(value) => (false, value),
        Err(err) => (true, serde_json::Value::String(err.to_string())),
    };
    let mut rendered = render_tool_output(&raw_output);
    if !is_error && rendered.trim().is_empty() {
        rendered = "Tool completed successfully with no output.".to_string();
    }

    let mut post_ctx = HookContext::new(HookPoint::PostToolUse);
    post_ctx.tool_name = Some(tool_name.clone());
    post_ctx.tool_result = Some(rendered.clone());
    if let HookAction::ModifyToolOutput { new_output } = hooks.dispatch(&post_ctx).await {
        rendered = render_tool_output(&new_output);
    }

    if is_error {
        tracker.complete_failure(&node_id, rendered.clone()).await;
    } else {
        tracker
            .complete_success(&node_id, Some(serde_json::Value::String(rendered.clone())))
            .await;
    }
    emitter
        .emit_event(EventBody::ToolCompleted {
            node_id,
            tool_name: tool_name.clone(),
            output: rendered.clone(),
            is_error,
        })
        .await;

    // Downgrade a policy-skip or not-permitted rejection from a
    // protocol-level error into a normal (non-erroring) tool result;
    // the model sees a plain notice, not a tool failure.
    if rendered.starts_with("skipped by policy") || rendered.contains("not permitted for this run")
    {
        is_error = false;
    }

    ToolOutcome {
        original_index,
        call_id,
        tool_name,
        arguments: input,
        rendered_output: rendered,
        raw_output: if raw_output.is_null() { None } else { Some(raw_output) },
        is_error,
    }
}

async fn execute_with_timeout(
    tools: &ToolRegistry,
    timeouts: &ToolTimeoutPolicy,
    tool_name: &str,
    input: serde_json::Value,
    cancel: fulcrum_proto::CancellationToken,
) -> Result<serde_json::Value, ToolError> {
    let Some(tool) = tools.get(tool_name) else {
        return Err(ToolError::NotFound(tool_name.to_string()));
    };
    let duration = timeouts.timeout_for(tool_name);
    tokio::select! {
        _ = cancel.cancelled() => Err(ToolError::ExecutionFailed("cancelled".to_string())),
        outcome = tokio::time::timeout(duration, tool.call(input)) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: tool_name.to_string(),
                elapsed_ms: duration.as_millis() as u64,
            }),
        },
    }
}

fn render_tool_output(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_leaked_marker(name: &str) -> bool {
    LEAKED_MARKERS.iter().any(|marker| name.contains(marker))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}\u{2026}")
    }
}

fn distance_since_last_assistant_reply(state: &TaskState) -> usize {
    let mut distance = 0;
    for message in state.messages.iter().rev() {
        if message.source == MessageSource::AssistantReply {
            return distance;
        }
        distance += message.content.len();
    }
    distance
}

fn append_missing_attachments(answer: &mut String, state: &TaskState) {
    let mut missing: Vec<&Attachment> = state
        .attachments
        .values()
        .filter(|a| !answer.contains(a.placeholder.as_str()))
        .collect();
    missing.sort_by_key(|a| {
        state
            .attachment_origin_iteration
            .get(&a.placeholder)
            .copied()
            .unwrap_or(0)
    });
    for attachment in missing {
        if let Some(reference) = attachment.canonical_reference() {
            if attachment.media_type.starts_with("image/") {
                answer.push_str(&format!("\n\n![{}]({reference})", attachment.display_name));
            } else {
                answer.push_str(&format!("\n\n[{}]({reference})", attachment.display_name));
            }
        }
    }
}

fn to_provider_messages(messages: &[&Message]) -> Vec<ProviderMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            MessageRole::System => out.push(ProviderMessage {
                role: Role::System,
                content: vec![ContentPart::Text {
                    text: message.content.clone(),
                }],
            }),
            MessageRole::User => out.push(ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text {
                    text: message.content.clone(),
                }],
            }),
            MessageRole::Assistant => {
                let mut content = Vec::new();
                if !message.content.is_empty() {
                    content.push(ContentPart::Text {
                        text: message.content.clone(),
                    });
                }
                for call in &message.tool_calls {
                    content.push(ContentPart::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.input.clone(),
                    });
                }
                out.push(ProviderMessage {
                    role: Role::Assistant,
                    content,
                });
            }
            MessageRole::Tool => {
                if let Some(result) = &message.tool_result {
                    out.push(ProviderMessage {
                        role: Role::User,
                        content: vec![ContentPart::ToolResult {
                            tool_use_id: result.tool_call_id.clone(),
                            content: result.content.clone(),
                            is_error: result.is_error,
                        }],
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fulcrum_context::NoCompaction;
    use fulcrum_core::AgentLevel;
    use fulcrum_proto::{CancellationToken, CausationId, CorrelationId, RunId, SessionId, WorkflowId};
    use fulcrum_provider::{ProviderError, ProviderResponse, ProviderStopReason, TokenUsage};
    use fulcrum_workflow::{LocalWorkflowTracker, TrackerIdentity};
    use futures_util::stream;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;

    fn identity() -> TrackerIdentity {
        TrackerIdentity {
            agent_level: AgentLevel::Core,
            session_id: SessionId::new("s-1"),
            run_id: RunId::new("r-1"),
            parent_run_id: None,
            correlation_id: CorrelationId::new("r-1"),
            causation_id: CausationId::new("r-1"),
        }
    }

    fn tracker_and_emitter() -> (SharedWorkflowTracker, SharedWorkflowEmitter) {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let tracker = Arc::new(LocalWorkflowTracker::new(WorkflowId::new("wf-1"), identity(), tx));
        (tracker.clone() as SharedWorkflowTracker, tracker as SharedWorkflowEmitter)
    }

    struct ScriptedProvider {
        turns: StdMutex<Vec<Vec<StreamEvent>>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn complete_stream(
            &self,
            _request: ProviderRequest,
            _cancel: CancellationToken,
        ) -> Result<fulcrum_provider::ProviderStream, ProviderError> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(ProviderError::InvalidResponse("no more scripted turns".into()));
            }
            let events = turns.remove(0);
            let boxed: Pin<Box<dyn futures_util::Stream<Item = StreamEvent> + Send>> =
                Box::pin(stream::iter(events));
            Ok(boxed)
        }
    }

    fn final_answer_response(text: &str) -> StreamEvent {
        StreamEvent::MessageComplete(ProviderResponse {
            content: vec![ContentPart::Text { text: text.to_string() }],
            stop_reason: ProviderStopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                cache_read_tokens: None,
                cache_creation_tokens: None,
            },
            model: "test-model".into(),
            cost: None,
            truncated: None,
        })
    }

    fn engine(provider: ScriptedProvider) -> ReactEngine {
        ReactEngine::new(
            ReactConfig {
                default_max_iterations: 5,
                ..Default::default()
            },
            Arc::new(provider),
            Arc::new(ToolRegistry::new()),
            ToolTimeoutPolicy::default(),
            Arc::new(NoCompaction),
            Arc::new(HookRegistry::new()),
        )
    }

    #[tokio::test]
    async fn single_shot_answer_stops_with_final_answer() {
        let provider = ScriptedProvider {
            turns: StdMutex::new(vec![vec![final_answer_response("42 is the answer")]]),
        };
        let engine = engine(provider);
        let mut state = TaskState::new(SessionId::new("s-1"), RunId::new("r-1"), None);
        let (tracker, emitter) = tracker_and_emitter();

        let result = engine
            .execute(
                &mut state,
                tracker,
                emitter,
                RunOverrides::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.stop_reason, StopReason::FinalAnswer);
        assert_eq!(result.iterations, 1);
        assert!(result.final_answer.contains("42 is the answer"));
    }

    #[tokio::test]
    async fn gate_violation_injects_correction_without_advancing_iteration() {
        // plan + a second call in the same turn violates the solitary-plan gate;
        // scripted as two ToolUseStart/End pairs in one turn, followed by a
        // clean second turn that answers directly.
        let engine = engine(ScriptedProvider {
            turns: StdMutex::new(vec![
                vec![
                    StreamEvent::ToolUseStart { id: "tu-1".into(), name: "plan".into() },
                    StreamEvent::ToolUseEnd { id: "tu-1".into() },
                    StreamEvent::ToolUseStart { id: "tu-2".into(), name: "file_read".into() },
                    StreamEvent::ToolUseEnd { id: "tu-2".into() },
                    final_answer_response(""),
                ],
                vec![final_answer_response("done")],
            ]),
        });
        let mut state = TaskState::new(SessionId::new("s-1"), RunId::new("r-1"), None);
        let (tracker, emitter) = tracker_and_emitter();

        let result = engine
            .execute(
                &mut state,
                tracker,
                emitter,
                RunOverrides::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.stop_reason, StopReason::FinalAnswer);
        assert!(state
            .messages
            .iter()
            .any(|m| m.source == MessageSource::Proactive && m.content.contains("系统提示")));
        // the violating turn does not advance the counter; only the
        // clean final-answer turn that follows it does.
        assert_eq!(state.iteration, 1);
    }

    #[tokio::test]
    async fn cancellation_before_first_iteration_stops_immediately() {
        let provider = ScriptedProvider {
            turns: StdMutex::new(vec![]),
        };
        let engine = engine(provider);
        let mut state = TaskState::new(SessionId::new("s-1"), RunId::new("r-1"), None);
        let (tracker, emitter) = tracker_and_emitter();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .execute(&mut state, tracker, emitter, RunOverrides::default(), cancel)
            .await
            .unwrap();

        assert_eq!(result.stop_reason, StopReason::Cancelled);
    }
}

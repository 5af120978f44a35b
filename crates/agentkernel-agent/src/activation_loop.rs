//! ActivationLoop: drives a single Activation end-to-end — prepare
//! the effective tool list, stream a provider turn, fan out tool calls
//! through PolicyGate and the ToolDispatcher, decide whether to continue or
//! stop, and (for autonomous agents) seed a follow-up cycle.

use crate::scheduler::Scheduler;
use agentkernel_core::types::{
    Activation, AgentProfile, EventType, Message, Role, SessionStatus, ToolCall,
};
use agentkernel_core::KernelHandle;
use agentkernel_llm::{ContentBlock, LlmContent, LlmMessage, LlmRequest, LlmTool, StreamChunk};
use agentkernel_policy::{PolicyContext, PolicyDecision};
use agentkernel_tools::ToolOutcome;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collected state from one provider turn — the adapter's `on_chunk`
/// closure cannot itself await, so we buffer everything it reports and act
/// on it once `ProviderAdapter::complete` returns.
#[derive(Default)]
struct TurnOutcome {
    text: String,
    tool_calls: Vec<(String, String, serde_json::Value)>,
    stop_reason: Option<String>,
    output_tokens: u32,
    stream_error: Option<String>,
    model_side_state: Option<serde_json::Value>,
}

pub async fn drive(scheduler: Arc<Scheduler>, activation: Activation, cancel: CancellationToken) {
    let activation_id = activation.activation_id.clone();
    let agent_id = activation.agent_id.clone();

    let Some(profile) = scheduler.registry.get(&agent_id) else {
        scheduler
            .event_log
            .append(
                &activation_id,
                &agent_id,
                EventType::Error,
                serde_json::json!({"message": format!("agent not found: {agent_id}")}),
            )
            .ok();
        scheduler
            .session_store
            .set_status(&activation_id, SessionStatus::Error)
            .await;
        scheduler.on_activation_finished(&activation_id).await;
        return;
    };

    scheduler.session_store.create(&activation).await;
    scheduler
        .event_log
        .append(
            &activation_id,
            &agent_id,
            EventType::Activation,
            serde_json::json!({
                "agent_id": agent_id,
                "input": activation.input,
                "parent_agent_id": activation.parent_agent_id,
                "parent_activation_id": activation.parent_activation_id,
                "spawn_depth": activation.spawn_depth,
            }),
        )
        .ok();
    scheduler
        .session_store
        .set_status(&activation_id, SessionStatus::Running)
        .await;
    scheduler
        .session_store
        .push_message(&activation_id, Message::user(activation.input.clone()))
        .await;

    let policy_ctx = PolicyContext {
        input: activation.input.clone(),
    };
    let tools = effective_tools(&profile, &policy_ctx);

    loop {
        if cancel.is_cancelled() || scheduler.is_killed() {
            finish_aborted(&scheduler, &activation_id).await;
            return;
        }
        scheduler.wait_if_paused().await;
        if cancel.is_cancelled() || scheduler.is_killed() {
            finish_aborted(&scheduler, &activation_id).await;
            return;
        }

        let Some(session) = scheduler.session_store.get(&activation_id).await else {
            return;
        };
        let model = profile
            .model
            .clone()
            .unwrap_or_else(|| scheduler.config.model.clone());
        let request = LlmRequest {
            model,
            messages: to_llm_messages(&session.messages),
            tools: if tools.is_empty() { None } else { Some(tools.clone()) },
            system: Some(profile.system_prompt.clone()),
            model_side_state: match &session.model_side_state {
                serde_json::Value::Null => None,
                state => Some(state.clone()),
            },
            ..Default::default()
        };

        let mut turn = TurnOutcome::default();
        let result = scheduler
            .provider
            .complete(request, Some(cancel.clone()), |chunk| match chunk {
                StreamChunk::Text(delta) => turn.text.push_str(&delta),
                StreamChunk::ToolCall { id, name, input } => {
                    turn.tool_calls.push((id, name, input));
                }
                StreamChunk::Done { stop_reason, output_tokens, model_side_state } => {
                    turn.stop_reason = stop_reason;
                    turn.output_tokens = output_tokens;
                    turn.model_side_state = model_side_state;
                }
                StreamChunk::Error(message) => turn.stream_error = Some(message),
            })
            .await;

        if !turn.text.is_empty() {
            scheduler
                .session_store
                .append_streaming_text(&activation_id, &turn.text)
                .await;
            scheduler
                .event_log
                .append(
                    &activation_id,
                    &agent_id,
                    EventType::StreamChunk,
                    serde_json::json!({"delta": turn.text}),
                )
                .ok();
        }

        let output_tokens = match result {
            Ok(tokens) => tokens,
            Err(e) => {
                scheduler
                    .event_log
                    .append(
                        &activation_id,
                        &agent_id,
                        EventType::Error,
                        serde_json::json!({"message": e.to_string()}),
                    )
                    .ok();
                scheduler
                    .session_store
                    .set_status(&activation_id, SessionStatus::Error)
                    .await;
                notify_parent_of_failure(&scheduler, &activation, &e.to_string()).await;
                scheduler.on_activation_finished(&activation_id).await;
                return;
            }
        };

        if let Some(message) = turn.stream_error {
            scheduler
                .event_log
                .append(
                    &activation_id,
                    &agent_id,
                    EventType::Error,
                    serde_json::json!({"message": message}),
                )
                .ok();
            scheduler
                .session_store
                .set_status(&activation_id, SessionStatus::Error)
                .await;
            notify_parent_of_failure(&scheduler, &activation, &message).await;
            scheduler.on_activation_finished(&activation_id).await;
            return;
        }

        if cancel.is_cancelled() || scheduler.is_killed() {
            finish_aborted(&scheduler, &activation_id).await;
            return;
        }

        if let Some(state) = turn.model_side_state.take() {
            scheduler.session_store.set_model_side_state(&activation_id, state).await;
        }

        if !turn.tool_calls.is_empty() {
            let tool_calls: Vec<ToolCall> = turn
                .tool_calls
                .iter()
                .map(|(id, name, input)| ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.to_string(),
                })
                .collect();
            let assistant_text = scheduler.session_store.take_streaming_text(&activation_id).await;
            scheduler
                .session_store
                .push_message(
                    &activation_id,
                    Message::assistant_with_tools(assistant_text, tool_calls),
                )
                .await;
            let total_tokens = scheduler.session_store.add_tokens(&activation_id, output_tokens as u64).await;
            scheduler.add_global_tokens(output_tokens as u64);
            scheduler
                .event_log
                .append(
                    &activation_id,
                    &agent_id,
                    EventType::TokenUpdate,
                    serde_json::json!({"tokens_added": output_tokens, "total": total_tokens}),
                )
                .ok();

            for (id, name, input) in &turn.tool_calls {
                scheduler
                    .event_log
                    .append(
                        &activation_id,
                        &agent_id,
                        EventType::ToolCall,
                        serde_json::json!({"id": id, "name": name, "args": input}),
                    )
                    .ok();

                let decision = agentkernel_policy::evaluate(&profile, name, input, &policy_ctx);
                let outcome = match decision {
                    PolicyDecision::Deny { reason } => {
                        scheduler
                            .event_log
                            .append(
                                &activation_id,
                                &agent_id,
                                EventType::PolicyDenied,
                                serde_json::json!({"tool": name, "reason": reason, "severity": "error"}),
                            )
                            .ok();
                        ToolOutcome {
                            result: format!("Error: denied by policy — {reason}"),
                            is_error: true,
                            extra_output_tokens: 0,
                        }
                    }
                    PolicyDecision::Escalate { triggered_by } => {
                        scheduler
                            .event_log
                            .append(
                                &activation_id,
                                &agent_id,
                                EventType::PolicyDenied,
                                serde_json::json!({"tool": name, "triggered_by": triggered_by, "severity": "warning"}),
                            )
                            .ok();
                        scheduler
                            .dispatcher
                            .dispatch(&profile, &activation, name, input, scheduler.as_ref())
                            .await
                    }
                    PolicyDecision::Allow => {
                        scheduler
                            .dispatcher
                            .dispatch(&profile, &activation, name, input, scheduler.as_ref())
                            .await
                    }
                };

                if cancel.is_cancelled() || scheduler.is_killed() {
                    finish_aborted(&scheduler, &activation_id).await;
                    return;
                }

                if outcome.extra_output_tokens > 0 {
                    let total_tokens = scheduler
                        .session_store
                        .add_tokens(&activation_id, outcome.extra_output_tokens as u64)
                        .await;
                    scheduler.add_global_tokens(outcome.extra_output_tokens as u64);
                    scheduler
                        .event_log
                        .append(
                            &activation_id,
                            &agent_id,
                            EventType::TokenUpdate,
                            serde_json::json!({"tokens_added": outcome.extra_output_tokens, "total": total_tokens}),
                        )
                        .ok();
                }
                scheduler
                    .event_log
                    .append(
                        &activation_id,
                        &agent_id,
                        EventType::ToolResult,
                        serde_json::json!({"id": id, "result": outcome.result, "is_error": outcome.is_error}),
                    )
                    .ok();
                if outcome.is_error {
                    scheduler
                        .event_log
                        .append(
                            &activation_id,
                            &agent_id,
                            EventType::Error,
                            serde_json::json!({"tool": name, "message": outcome.result}),
                        )
                        .ok();
                }
                scheduler
                    .session_store
                    .push_message(
                        &activation_id,
                        Message::tool_result_with_error(id.clone(), outcome.result, outcome.is_error),
                    )
                    .await;
            }
            // A tool round-trip always continues to the next turn.
            continue;
        }

        // No tool calls: commit the assistant turn and decide stop/continue.
        let assistant_text = scheduler.session_store.take_streaming_text(&activation_id).await;
        scheduler
            .session_store
            .push_message(&activation_id, Message::assistant(assistant_text.clone()))
            .await;
        let total_tokens = scheduler.session_store.add_tokens(&activation_id, output_tokens as u64).await;
        scheduler.add_global_tokens(output_tokens as u64);
        scheduler
            .event_log
            .append(
                &activation_id,
                &agent_id,
                EventType::TokenUpdate,
                serde_json::json!({"tokens_added": output_tokens, "total": total_tokens}),
            )
            .ok();
        let turns = scheduler.session_store.increment_turns(&activation_id).await;

        if turns < scheduler.config.min_turns_before_stop && assistant_text.trim().is_empty() {
            scheduler
                .session_store
                .push_message(&activation_id, Message::user("Continue.".to_string()))
                .await;
            continue;
        }

        scheduler
            .session_store
            .set_status(&activation_id, SessionStatus::Completed)
            .await;
        scheduler
            .event_log
            .append(
                &activation_id,
                &agent_id,
                EventType::Complete,
                serde_json::json!({"final_text": assistant_text, "stop_reason": turn.stop_reason}),
            )
            .ok();
        info!(session = %activation_id, agent = %agent_id, "activation completed");

        maybe_seed_autonomous_cycle(&scheduler, &profile, &activation).await;
        scheduler.on_activation_finished(&activation_id).await;
        return;
    }
}

async fn finish_aborted(scheduler: &Arc<Scheduler>, activation_id: &str) {
    scheduler
        .session_store
        .set_status(activation_id, SessionStatus::Aborted)
        .await;
    scheduler.on_activation_finished(activation_id).await;
}

async fn notify_parent_of_failure(scheduler: &Arc<Scheduler>, activation: &Activation, message: &str) {
    if activation.parent_agent_id.is_none() {
        return;
    }
    let _ = KernelHandle::signal_parent(
        scheduler.as_ref(),
        activation.parent_agent_id.as_deref(),
        activation.parent_activation_id.as_deref(),
        format!("child activation failed: {message}"),
    )
    .await;
}

async fn maybe_seed_autonomous_cycle(scheduler: &Arc<Scheduler>, profile: &AgentProfile, activation: &Activation) {
    let Some(auto) = &profile.autonomous_config else {
        return;
    };
    let max_cycles = auto.max_cycles.unwrap_or(scheduler.config.autonomous_max_cycles);
    let cycles_done = scheduler
        .session_store
        .increment_autonomous_cycles(&activation.activation_id)
        .await;
    if cycles_done >= max_cycles {
        return;
    }
    let stop_when_complete = auto
        .stop_when_complete
        .unwrap_or(scheduler.config.autonomous_stop_when_complete);
    if stop_when_complete {
        scheduler
            .event_log
            .append(
                &activation.activation_id,
                &activation.agent_id,
                EventType::WorkflowComplete,
                serde_json::json!({"cycles_done": cycles_done}),
            )
            .ok();
        return;
    }
    if !auto.seed_task_when_idle && !scheduler.config.force_reflection {
        return;
    }
    let mut reflection = Activation::child(
        activation,
        activation.agent_id.clone(),
        "Reflect on progress so far and continue the mission.".to_string(),
        activation.priority,
    );
    // Carry the mission's cumulative cycle count forward onto the new
    // Activation/Session — each cycle is a fresh activation_id, so without
    // this `autonomous_cycles_done` would reset to 0 every time and
    // `cycles_done >= max_cycles` would never trip.
    reflection.autonomous_cycles_done = cycles_done;
    if let Err(e) = scheduler.enqueue(reflection) {
        warn!(agent = %activation.agent_id, error = %e, "failed to seed autonomous cycle");
    }
}

/// Filters the closed built-in set through the PolicyGate using empty args
/// (rules 1/2/4/5 need no args; rule 3's path-scope check only fires when a
/// path is present, so it is re-checked per call at dispatch time) and
/// appends the agent's declared custom tools.
fn effective_tools(profile: &AgentProfile, ctx: &PolicyContext) -> Vec<LlmTool> {
    let mut tools = Vec::new();
    for name in agentkernel_tools::ToolDispatcher::builtin_names() {
        let decision = agentkernel_policy::evaluate(profile, name, &serde_json::Value::Null, ctx);
        if matches!(decision, PolicyDecision::Allow | PolicyDecision::Escalate { .. }) {
            tools.push(builtin_tool_definition(name));
        }
    }
    for custom in &profile.custom_tools {
        let decision = agentkernel_policy::evaluate(profile, &custom.name, &serde_json::Value::Null, ctx);
        if matches!(decision, PolicyDecision::Allow | PolicyDecision::Escalate { .. }) {
            tools.push(LlmTool {
                name: custom.name.clone(),
                description: custom.description.clone(),
                input_schema: custom.parameters.clone(),
            });
        }
    }
    tools
}

fn builtin_tool_definition(name: &str) -> LlmTool {
    let (description, schema) = match name {
        "vfs_read" => (
            "Read a file from the virtual workspace.",
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        ),
        "vfs_write" => (
            "Write (or overwrite) a file in the virtual workspace.",
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]}),
        ),
        "vfs_list" => (
            "List files whose path matches a prefix or glob pattern.",
            serde_json::json!({"type": "object", "properties": {"prefix": {"type": "string"}}}),
        ),
        "vfs_delete" => (
            "Delete a file from the virtual workspace.",
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        ),
        "spawn_agent" => (
            "Write a new agent file and activate it as a child.",
            serde_json::json!({"type": "object", "properties": {"filename": {"type": "string"}, "content": {"type": "string"}, "task": {"type": "string"}, "novelty_override": {"type": "boolean"}}, "required": ["filename", "content", "task"]}),
        ),
        "signal_parent" => (
            "Send a message to the parent activation and re-enqueue it.",
            serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
        ),
        "web_search" => (
            "Search the web for a query.",
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        ),
        "web_fetch" => (
            "Fetch the contents of a URL.",
            serde_json::json!({"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}),
        ),
        _ => (
            "Built-in tool.",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
    };
    LlmTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: schema,
    }
}

/// Converts the kernel's internal `Message` history into Anthropic-shaped
/// `LlmMessage`s. The kernel tracks tool calls/results as flat messages with
/// a `Role::Tool` marker, but Anthropic has no "tool" role: a model's tool
/// calls must appear as `tool_use` blocks inside an assistant message, and
/// every result answering them must appear as `tool_result` blocks inside a
/// *single* following user message. `Role::System` is dropped here — the
/// system prompt travels separately via `LlmRequest.system`.
fn to_llm_messages(messages: &[Message]) -> Vec<LlmMessage> {
    let mut out: Vec<LlmMessage> = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role {
            Role::System => continue,
            Role::User => out.push(LlmMessage {
                role: "user".to_string(),
                content: LlmContent::Text(m.content.clone()),
            }),
            Role::Assistant => {
                let content = match &m.tool_calls {
                    Some(calls) if !calls.is_empty() => {
                        let mut blocks = Vec::with_capacity(calls.len() + 1);
                        if !m.content.is_empty() {
                            blocks.push(ContentBlock::Text { text: m.content.clone() });
                        }
                        blocks.extend(calls.iter().map(|tc| ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: serde_json::from_str(&tc.arguments)
                                .unwrap_or(serde_json::Value::Null),
                        }));
                        LlmContent::Blocks(blocks)
                    }
                    _ => LlmContent::Text(m.content.clone()),
                };
                out.push(LlmMessage { role: "assistant".to_string(), content });
            }
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone(),
                    is_error: if m.tool_is_error == Some(true) { Some(true) } else { None },
                };
                // Anthropic requires every tool_result answering one assistant
                // turn to live in a single user message; fold consecutive
                // Role::Tool messages into the trailing user/Blocks message.
                let merged = match out.last_mut() {
                    Some(last) if last.role.as_str() == "user" => match &mut last.content {
                        LlmContent::Blocks(blocks) => {
                            blocks.push(block);
                            true
                        }
                        LlmContent::Text(_) => false,
                    },
                    _ => false,
                };
                if !merged {
                    out.push(LlmMessage {
                        role: "user".to_string(),
                        content: LlmContent::Blocks(vec![block]),
                    });
                }
            }
        }
    }
    out
}

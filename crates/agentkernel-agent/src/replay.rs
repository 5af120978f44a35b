//! ReplayController: rebuilds `SessionStore` + `Vfs` + `AgentRegistry`
//! state from an `EventLog` prefix, optionally starting from a `Checkpoint`
//! rather than genesis.
//!
//! The guiding rule is the one in the architecture notes: replaying a tool
//! call never re-executes it — the provider is never called, and
//! VFS/registry tools are never re-run against live collaborators. Instead
//! each `ToolCall`/`ToolResult` pair is re-applied from what was recorded:
//! the call's arguments for tools that mutate the VFS (`vfs_write`,
//! `vfs_delete`, `spawn_agent`), and the result text for the `SessionStore`
//! message it produced. `AgentRegistry` is never snapshotted directly — it
//! is re-derived by re-parsing every `agents/*` path out of the rebuilt VFS,
//! which is exactly how the live registry is populated in the first place.

use agentkernel_core::types::{EventEntry, EventType, Message, SessionStatus, ToolCall};
use agentkernel_registry::AgentRegistry;
use agentkernel_vfs::{MemoryVfs, Vfs};
use std::collections::HashMap;
use std::sync::Arc;

use crate::session::{Session, SessionStore};

/// The rebuilt state a caller swaps in for live collaborators.
pub struct ReplayOutcome {
    pub session_store: Arc<SessionStore>,
    pub vfs: Arc<MemoryVfs>,
    pub registry: Arc<AgentRegistry>,
    /// Sum of every `TokenUpdate` applied — the scheduler's global counter.
    pub tokens_consumed: u64,
    pub last_applied_id: u64,
}

/// Per-activation scratch state held only for the duration of replay; never
/// exposed to callers.
#[derive(Default)]
struct PendingTurn {
    tool_calls: Vec<ToolCall>,
    tool_args: HashMap<String, (String, serde_json::Value)>,
    tool_results: Vec<(String, String, bool)>,
}

/// Rebuilds state from `events` (assumed already filtered to those after
/// `checkpoint`'s `last_event_id`, in ascending `id` order) up to and
/// including `up_to_event_id`. Pass `checkpoint = None` to replay from
/// genesis.
pub async fn replay_from(
    events: &[EventEntry],
    checkpoint: Option<&agentkernel_core::types::Checkpoint>,
    up_to_event_id: u64,
) -> agentkernel_core::Result<ReplayOutcome> {
    let (session_store, vfs, mut tokens_consumed) = match checkpoint {
        Some(cp) => state_from_checkpoint(cp).await?,
        None => (Arc::new(SessionStore::new()), Arc::new(MemoryVfs::new()), 0u64),
    };
    let registry = Arc::new(AgentRegistry::new());
    rebuild_registry_from_vfs(&vfs, &registry).await;

    let mut pending: HashMap<String, PendingTurn> = HashMap::new();
    let mut last_applied = checkpoint.map(|c| c.last_event_id).unwrap_or(0);

    for event in events {
        if event.id <= last_applied {
            continue;
        }
        if event.id > up_to_event_id {
            break;
        }
        apply_event(
            &session_store,
            &vfs,
            &registry,
            &mut pending,
            &mut tokens_consumed,
            event,
        )
        .await?;
        last_applied = event.id;
    }

    Ok(ReplayOutcome {
        session_store,
        vfs,
        registry,
        tokens_consumed,
        last_applied_id: last_applied,
    })
}

/// Lighter variant: resets state to exactly what a `Checkpoint` recorded,
/// replaying nothing beyond it. Used when a caller wants to roll back to a
/// known-good point rather than reconstruct up to a specific later event.
pub async fn restore_from(
    checkpoint: &agentkernel_core::types::Checkpoint,
) -> agentkernel_core::Result<ReplayOutcome> {
    let (session_store, vfs, tokens_consumed) = state_from_checkpoint(checkpoint).await?;
    let registry = Arc::new(AgentRegistry::new());
    rebuild_registry_from_vfs(&vfs, &registry).await;
    Ok(ReplayOutcome {
        session_store,
        vfs,
        registry,
        tokens_consumed,
        last_applied_id: checkpoint.last_event_id,
    })
}

async fn state_from_checkpoint(
    checkpoint: &agentkernel_core::types::Checkpoint,
) -> agentkernel_core::Result<(Arc<SessionStore>, Arc<MemoryVfs>, u64)> {
    #[derive(serde::Deserialize)]
    struct CheckpointState {
        #[serde(default)]
        sessions: Vec<Session>,
        #[serde(default)]
        vfs: HashMap<String, String>,
        #[serde(default)]
        tokens_consumed: u64,
    }
    let state: CheckpointState = serde_json::from_value(checkpoint.state.clone())?;

    let store = SessionStore::new();
    for session in state.sessions {
        store.insert_raw(session).await;
    }
    let vfs = MemoryVfs::seeded(state.vfs);
    Ok((Arc::new(store), Arc::new(vfs), state.tokens_consumed))
}

async fn rebuild_registry_from_vfs(vfs: &Arc<MemoryVfs>, registry: &Arc<AgentRegistry>) {
    for path in vfs.get_all_paths().await {
        if !path.starts_with("agents/") {
            continue;
        }
        if let Some(content) = vfs.read(&path).await {
            if let Err(e) = registry.register_from_file(&path, &content) {
                tracing::warn!(path = %path, error = %e, "replay: failed to re-register agent from VFS snapshot");
            }
        }
    }
}

async fn apply_event(
    session_store: &Arc<SessionStore>,
    vfs: &Arc<MemoryVfs>,
    registry: &Arc<AgentRegistry>,
    pending: &mut HashMap<String, PendingTurn>,
    tokens_consumed: &mut u64,
    event: &EventEntry,
) -> agentkernel_core::Result<()> {
    let activation_id = event.activation_id.clone();
    match event.event_type {
        EventType::Activation => {
            let input = event
                .data
                .get("input")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let parent_agent_id = event
                .data
                .get("parent_agent_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let parent_activation_id = event
                .data
                .get("parent_activation_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let spawn_depth = event
                .data
                .get("spawn_depth")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let session = Session::reconstruct(
                activation_id.clone(),
                event.agent_id.clone(),
                parent_agent_id,
                parent_activation_id,
                spawn_depth,
                event.timestamp,
            );
            session_store.insert_raw(session).await;
            session_store.push_message(&activation_id, Message::user(input)).await;
            session_store.set_status(&activation_id, SessionStatus::Running).await;
            pending.insert(activation_id, PendingTurn::default());
        }
        EventType::StreamChunk => {
            flush_tool_round(session_store, pending, &activation_id).await;
            if let Some(delta) = event.data.get("delta").and_then(|v| v.as_str()) {
                session_store.append_streaming_text(&activation_id, delta).await;
            }
        }
        EventType::ToolCall => {
            let id = event.data.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let name = event.data.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let args = event.data.get("args").cloned().unwrap_or(serde_json::Value::Null);
            let turn = pending.entry(activation_id).or_default();
            turn.tool_calls.push(ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: args.to_string(),
            });
            turn.tool_args.insert(id, (name, args));
        }
        EventType::ToolResult => {
            let id = event.data.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let result = event.data.get("result").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let is_error = event.data.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
            if let Some(turn) = pending.get_mut(&activation_id) {
                if let Some((name, args)) = turn.tool_args.remove(&id) {
                    if !is_error {
                        apply_vfs_mutation(vfs, registry, &name, &args).await;
                    }
                }
                turn.tool_results.push((id, result, is_error));
            }
        }
        EventType::TokenUpdate => {
            let tokens_added = event.data.get("tokens_added").and_then(|v| v.as_u64()).unwrap_or(0);
            session_store.add_tokens(&activation_id, tokens_added).await;
            *tokens_consumed += tokens_added;
        }
        EventType::Complete => {
            flush_tool_round(session_store, pending, &activation_id).await;
            let final_text = event
                .data
                .get("final_text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            // The live loop already committed this message via
            // `take_streaming_text`; `take_streaming_text` here drains
            // whatever residue remains so a later checkpoint doesn't carry
            // stale streaming text forward.
            session_store.take_streaming_text(&activation_id).await;
            session_store.push_message(&activation_id, Message::assistant(final_text)).await;
            session_store.set_status(&activation_id, SessionStatus::Completed).await;
            pending.remove(&activation_id);
        }
        EventType::Error => {
            flush_tool_round(session_store, pending, &activation_id).await;
            // Tool-scoped errors carry a "tool" key and don't end the
            // activation (the loop continues to the next turn); only
            // activation-level errors (no "tool" key) are terminal.
            if event.data.get("tool").is_none() {
                session_store.set_status(&activation_id, SessionStatus::Error).await;
                pending.remove(&activation_id);
            }
        }
        EventType::Spawn | EventType::Signal | EventType::PolicyDenied | EventType::Warning
        | EventType::WorkflowComplete => {
            // Metadata-only: no SessionStore/VFS mutation to re-apply. Spawn's
            // VFS/registry side effects are already covered by the
            // `spawn_agent` ToolCall/ToolResult pair that precedes it.
        }
    }
    Ok(())
}

async fn flush_tool_round(
    session_store: &Arc<SessionStore>,
    pending: &mut HashMap<String, PendingTurn>,
    activation_id: &str,
) {
    let Some(turn) = pending.get_mut(activation_id) else { return };
    if turn.tool_calls.is_empty() {
        return;
    }
    let tool_calls = std::mem::take(&mut turn.tool_calls);
    turn.tool_args.clear();
    let results = std::mem::take(&mut turn.tool_results);

    let text = session_store.take_streaming_text(activation_id).await;
    session_store
        .push_message(activation_id, Message::assistant_with_tools(text, tool_calls))
        .await;
    for (id, result, is_error) in results {
        session_store
            .push_message(activation_id, Message::tool_result_with_error(id, result, is_error))
            .await;
    }
}

async fn apply_vfs_mutation(
    vfs: &Arc<MemoryVfs>,
    registry: &Arc<AgentRegistry>,
    tool_name: &str,
    args: &serde_json::Value,
) {
    match tool_name {
        "vfs_write" => {
            let (Some(path), Some(content)) = (
                args.get("path").and_then(|v| v.as_str()),
                args.get("content").and_then(|v| v.as_str()),
            ) else {
                return;
            };
            if vfs.write(path, content.to_string()).await.is_ok() && path.starts_with("agents/") {
                let _ = registry.register_from_file(path, content);
            }
        }
        "vfs_delete" => {
            let Some(path) = args.get("path").and_then(|v| v.as_str()) else { return };
            if matches!(vfs.delete(path).await, Ok(true)) && path.starts_with("agents/") {
                registry.unregister(path);
            }
        }
        "spawn_agent" => {
            let (Some(filename), Some(content)) = (
                args.get("filename").and_then(|v| v.as_str()),
                args.get("content").and_then(|v| v.as_str()),
            ) else {
                return;
            };
            let child_path = format!("agents/{filename}");
            if vfs.write(&child_path, content.to_string()).await.is_ok() {
                let _ = registry.register_from_file(&child_path, content);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentkernel_core::event_log::EventLog;
    use agentkernel_core::types::Activation;

    fn log_activation(log: &EventLog, activation: &Activation) {
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::Activation,
            serde_json::json!({"input": activation.input}),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn replays_simple_text_turn() {
        let log = EventLog::new();
        let activation = Activation::root("agents/w.md", "hello");
        log_activation(&log, &activation);
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::StreamChunk,
            serde_json::json!({"delta": "hi there"}),
        )
        .unwrap();
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::TokenUpdate,
            serde_json::json!({"tokens_added": 12, "total": 12}),
        )
        .unwrap();
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::Complete,
            serde_json::json!({"final_text": "hi there", "stop_reason": "end_turn"}),
        )
        .unwrap();

        let events = log.snapshot();
        let outcome = replay_from(&events, None, log.last_id()).await.unwrap();
        let session = outcome.session_store.get(&activation.activation_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, "hi there");
        assert_eq!(session.token_count, 12);
        assert_eq!(outcome.tokens_consumed, 12);
    }

    #[tokio::test]
    async fn replays_tool_round_trip_and_rebuilds_vfs() {
        let log = EventLog::new();
        let activation = Activation::root("agents/w.md", "write a file");
        log_activation(&log, &activation);
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::ToolCall,
            serde_json::json!({"id": "call-1", "name": "vfs_write", "args": {"path": "notes/a.md", "content": "hi"}}),
        )
        .unwrap();
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::ToolResult,
            serde_json::json!({"id": "call-1", "result": "Written to notes/a.md", "is_error": false}),
        )
        .unwrap();
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::StreamChunk,
            serde_json::json!({"delta": "done"}),
        )
        .unwrap();
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::Complete,
            serde_json::json!({"final_text": "done", "stop_reason": "end_turn"}),
        )
        .unwrap();

        let events = log.snapshot();
        let outcome = replay_from(&events, None, log.last_id()).await.unwrap();
        assert_eq!(outcome.vfs.read("notes/a.md").await, Some("hi".to_string()));
        let session = outcome.session_store.get(&activation.activation_id).await.unwrap();
        // user input, assistant_with_tools, tool_result, final assistant text
        assert_eq!(session.messages.len(), 4);
        assert!(session.messages[1].tool_calls.is_some());
        assert_eq!(session.messages[2].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn tool_error_result_does_not_mutate_vfs() {
        let log = EventLog::new();
        let activation = Activation::root("agents/w.md", "try");
        log_activation(&log, &activation);
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::ToolCall,
            serde_json::json!({"id": "call-1", "name": "vfs_write", "args": {"path": "notes/a.md", "content": "hi"}}),
        )
        .unwrap();
        log.append(
            &activation.activation_id,
            &activation.agent_id,
            EventType::ToolResult,
            serde_json::json!({"id": "call-1", "result": "Error: denied by policy", "is_error": true}),
        )
        .unwrap();

        let events = log.snapshot();
        let outcome = replay_from(&events, None, log.last_id()).await.unwrap();
        assert_eq!(outcome.vfs.read("notes/a.md").await, None);
    }

    #[tokio::test]
    async fn restore_from_checkpoint_without_further_events() {
        let store = SessionStore::new();
        let activation = Activation::root("agents/w.md", "hello");
        store.create(&activation).await;
        store.set_status(&activation.activation_id, SessionStatus::Running).await;
        store.push_message(&activation.activation_id, Message::user("hello")).await;

        let sessions = store.snapshot().await;
        let state = serde_json::json!({
            "sessions": sessions,
            "vfs": {"agents/w.md": "---\n---\nhi"},
            "tokens_consumed": 40,
        });
        let checkpoint = agentkernel_core::types::Checkpoint {
            last_event_id: 7,
            taken_at: chrono::Utc::now(),
            state,
        };

        let outcome = restore_from(&checkpoint).await.unwrap();
        assert_eq!(outcome.last_applied_id, 7);
        assert_eq!(outcome.tokens_consumed, 40);
        let restored = outcome.session_store.get(&activation.activation_id).await.unwrap();
        assert_eq!(restored.status, SessionStatus::Running);
        assert_eq!(restored.messages.len(), 1);
        assert!(outcome.registry.get("agents/w.md").is_some());
    }
}

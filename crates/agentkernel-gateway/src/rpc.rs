//! Routes one `RpcRequest` to the matching `kernel.*` operation and
//! returns the matching `RpcResponse`. Never panics on malformed params —
//! always degrades to a `-32602` invalid-params error.

use agentkernel_agent::{ReplayOutcome, Scheduler};
use agentkernel_core::protocol::{RpcRequest, RpcResponse};
use agentkernel_core::types::Activation;
use agentkernel_vfs::Vfs;
use std::sync::Arc;

pub async fn route_rpc(scheduler: &Arc<Scheduler>, req: RpcRequest) -> RpcResponse {
    match req.method.as_str() {
        "kernel.enqueue" => enqueue(scheduler, req),
        "kernel.run" => run(scheduler, req),
        "kernel.pause" => {
            scheduler.pause();
            RpcResponse::ok(req.id, serde_json::json!({}))
        }
        "kernel.resume" => {
            scheduler.resume();
            RpcResponse::ok(req.id, serde_json::json!({}))
        }
        "kernel.killAll" => {
            scheduler.kill_all().await;
            RpcResponse::ok(req.id, serde_json::json!({}))
        }
        "kernel.status" => {
            let status = scheduler.status().await;
            RpcResponse::ok(req.id, serde_json::to_value(status).unwrap_or(serde_json::Value::Null))
        }
        "kernel.replayFromEvent" => replay_from_event(scheduler, req).await,
        "kernel.restoreFromEvent" => restore_from_checkpoint(scheduler, req).await,
        other => RpcResponse::method_not_found(req.id, other),
    }
}

fn enqueue(scheduler: &Arc<Scheduler>, req: RpcRequest) -> RpcResponse {
    let Some(agent_id) = req.params.get("agentId").and_then(|v| v.as_str()) else {
        return RpcResponse::err(req.id, -32602, "missing required param: agentId");
    };
    let input = req.params.get("input").and_then(|v| v.as_str()).unwrap_or_default();
    let activation = Activation::root(agent_id, input);
    let activation_id = activation.activation_id.clone();
    match scheduler.enqueue(activation) {
        Ok(()) => RpcResponse::ok(req.id, serde_json::json!({ "activationId": activation_id })),
        Err(e) => RpcResponse::internal_error(req.id, e.to_string()),
    }
}

/// Kicks `run_until_empty` off in the background — a run can take many
/// provider turns, so this does not block the RPC response on completion.
/// Progress is visible through the `kernel.status` poll or the pushed
/// `log`/`session` events.
fn run(scheduler: &Arc<Scheduler>, req: RpcRequest) -> RpcResponse {
    let scheduler = Arc::clone(scheduler);
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_until_empty().await {
            tracing::warn!(error = %e, "kernel.run exited with an error");
        }
    });
    RpcResponse::ok(req.id, serde_json::json!({ "started": true }))
}

async fn replay_from_event(scheduler: &Arc<Scheduler>, req: RpcRequest) -> RpcResponse {
    let Some(event_id) = req.params.get("eventId").and_then(|v| v.as_u64()) else {
        return RpcResponse::err(req.id, -32602, "missing required param: eventId");
    };
    let checkpoint = scheduler.latest_checkpoint().await;
    let events = scheduler.event_log.snapshot();
    match agentkernel_agent::replay_from(&events, checkpoint.as_ref(), event_id).await {
        Ok(outcome) => RpcResponse::ok(req.id, replay_summary(&outcome).await),
        Err(e) => RpcResponse::internal_error(req.id, e.to_string()),
    }
}

async fn restore_from_checkpoint(scheduler: &Arc<Scheduler>, req: RpcRequest) -> RpcResponse {
    let Some(checkpoint) = scheduler.latest_checkpoint().await else {
        return RpcResponse::err(req.id, -32000, "no checkpoint has been taken yet");
    };
    match agentkernel_agent::restore_from(&checkpoint).await {
        Ok(outcome) => RpcResponse::ok(req.id, replay_summary(&outcome).await),
        Err(e) => RpcResponse::internal_error(req.id, e.to_string()),
    }
}

async fn replay_summary(outcome: &ReplayOutcome) -> serde_json::Value {
    let sessions = outcome.session_store.snapshot().await;
    serde_json::json!({
        "lastAppliedEventId": outcome.last_applied_id,
        "tokensConsumed": outcome.tokens_consumed,
        "sessionCount": sessions.len(),
        "vfsPathCount": outcome.vfs.get_all_paths().await.len(),
        "registeredAgentCount": outcome.registry.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentkernel_core::event_log::EventLog;
    use agentkernel_llm::{MockProvider, ProviderAdapter};
    use agentkernel_registry::AgentRegistry;
    use agentkernel_tools::{ReqwestWebAccess, ToolDispatcher};
    use agentkernel_vfs::MemoryVfs;

    fn build_scheduler() -> Arc<Scheduler> {
        let event_log = Arc::new(EventLog::new());
        let session_store = Arc::new(agentkernel_agent::SessionStore::new());
        let registry = Arc::new(AgentRegistry::new());
        registry
            .register_from_file("agents/w.md", "---\nname: W\n---\nGo.\n")
            .unwrap();
        let vfs: Arc<dyn Vfs> = Arc::new(MemoryVfs::new());
        let provider = Arc::new(ProviderAdapter::new(Arc::new(MockProvider::repeating(vec![]))));
        let config = agentkernel_core::types::KernelConfig::default();
        let dispatcher = Arc::new(
            ToolDispatcher::new(
                vfs.clone(),
                registry.clone(),
                provider.clone(),
                Arc::new(ReqwestWebAccess::new()),
            )
            .with_limits(config.tool_result_cap, config.suggestion_distance),
        );
        Scheduler::new(
            config,
            event_log,
            session_store,
            registry,
            vfs,
            provider,
            dispatcher,
        )
    }

    fn req(method: &str, params: serde_json::Value) -> RpcRequest {
        RpcRequest { id: "1".into(), method: method.into(), params }
    }

    #[tokio::test]
    async fn enqueue_requires_agent_id() {
        let scheduler = build_scheduler();
        let response = route_rpc(&scheduler, req("kernel.enqueue", serde_json::json!({}))).await;
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn enqueue_returns_activation_id() {
        let scheduler = build_scheduler();
        let response = route_rpc(
            &scheduler,
            req("kernel.enqueue", serde_json::json!({"agentId": "agents/w.md", "input": "hi"})),
        )
        .await;
        assert!(response.result.unwrap().get("activationId").is_some());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let scheduler = build_scheduler();
        let response = route_rpc(&scheduler, req("kernel.bogus", serde_json::json!({}))).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn status_reports_idle_kernel() {
        let scheduler = build_scheduler();
        let response = route_rpc(&scheduler, req("kernel.status", serde_json::json!({}))).await;
        let result = response.result.unwrap();
        assert_eq!(result["is_running"], false);
    }

    #[tokio::test]
    async fn restore_without_checkpoint_errors() {
        let scheduler = build_scheduler();
        let response = route_rpc(&scheduler, req("kernel.restoreFromEvent", serde_json::json!({}))).await;
        assert_eq!(response.error.unwrap().code, -32000);
    }
}

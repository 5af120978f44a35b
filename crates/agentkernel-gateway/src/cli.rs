//! Shared workspace-loading + serve wiring, reused by the standalone
//! `agentkernel-gateway` binary and by the root `agentkernel` CLI's `serve`
//! subcommand so the two entry points can't drift out of sync.

use crate::auth::ResolvedAuth;
use crate::server::{serve, GatewayState};
use agentkernel_agent::Scheduler;
use agentkernel_core::types::{AuthConfig, AuthMode, BindMode, GatewayConfig, KernelConfig};
use agentkernel_llm::{AnthropicProvider, LlmProvider, MockProvider, ProviderAdapter};
use agentkernel_registry::AgentRegistry;
use agentkernel_tools::{ReqwestWebAccess, ToolDispatcher};
use agentkernel_vfs::{MemoryVfs, Vfs};
use std::path::Path;
use std::sync::Arc;

/// Builds a kernel over `workspace` and serves it until killed. `bind` is
/// one of `loopback`/`localhost`/`127.0.0.1` or anything else (LAN).
#[allow(clippy::too_many_arguments)]
pub async fn run_cli(
    workspace: &Path,
    kernel_config: KernelConfig,
    port: Option<u16>,
    bind: String,
    token: Option<String>,
    no_auth: bool,
) -> anyhow::Result<()> {
    let bind_mode = match bind.as_str() {
        "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
        _ => BindMode::Lan,
    };
    let auth_config = if no_auth {
        AuthConfig { mode: AuthMode::None, token: None }
    } else {
        AuthConfig { mode: AuthMode::Token, token }
    };
    let gateway_config = GatewayConfig {
        port: port.unwrap_or(18789),
        bind: bind_mode,
        auth: auth_config,
    };

    let env_token = std::env::var("AGENTKERNEL_GATEWAY_TOKEN").ok();
    let auth = ResolvedAuth::from_config(&gateway_config.auth, env_token);

    let vfs: Arc<dyn Vfs> = Arc::new(load_workspace(workspace)?);
    let registry = Arc::new(AgentRegistry::new());
    for path in vfs.get_all_paths().await {
        if let Some(content) = vfs.read(&path).await {
            if path.starts_with("agents/") {
                if let Err(e) = registry.register_from_file(&path, &content) {
                    tracing::warn!(path = %path, error = %e, "skipping malformed agent profile");
                }
            }
        }
    }

    let provider: Arc<dyn LlmProvider> = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) => {
            let mut provider = AnthropicProvider::new(key);
            if let Ok(base_url) = std::env::var("ANTHROPIC_API_URL") {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        Err(_) => {
            tracing::warn!("ANTHROPIC_API_KEY not set; running with a no-op mock provider");
            Arc::new(MockProvider::repeating(vec![]))
        }
    };
    let provider = Arc::new(ProviderAdapter::new(provider));

    let event_log = Arc::new(match &kernel_config.event_log_path {
        Some(path) => agentkernel_core::event_log::EventLog::open(path)?,
        None => agentkernel_core::event_log::EventLog::new(),
    });
    let session_store = Arc::new(agentkernel_agent::SessionStore::new());
    let dispatcher = Arc::new(
        ToolDispatcher::new(
            vfs.clone(),
            registry.clone(),
            provider.clone(),
            Arc::new(ReqwestWebAccess::new()),
        )
        .with_limits(kernel_config.tool_result_cap, kernel_config.suggestion_distance),
    );
    let scheduler = Scheduler::new(
        kernel_config,
        event_log,
        session_store,
        registry,
        vfs,
        provider,
        dispatcher,
    );

    let state = Arc::new(GatewayState { scheduler, auth });
    serve(state, &gateway_config).await
}

/// Walks `root` and seeds a `MemoryVfs` with every regular file found,
/// relative to `root` with forward slashes.
fn load_workspace(root: &Path) -> anyhow::Result<MemoryVfs> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        let path = relative.to_string_lossy().replace('\\', "/");
        let content = std::fs::read_to_string(entry.path())?;
        files.push((path, content));
    }
    Ok(MemoryVfs::seeded(files))
}

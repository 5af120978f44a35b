//! `agentkernel` — CLI entry point. Builds a kernel over a workspace
//! directory (agent profiles live under `agents/`) and either drives a
//! single root Activation to completion or hands off to the gateway's
//! WebSocket surface for a host UI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentkernel_agent::Scheduler;
use agentkernel_core::types::{Activation, KernelConfig};
use agentkernel_llm::{AnthropicProvider, LlmProvider, MockProvider, ProviderAdapter};
use agentkernel_registry::AgentRegistry;
use agentkernel_tools::{ReqwestWebAccess, ToolDispatcher};
use agentkernel_vfs::{MemoryVfs, Vfs};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentkernel", about = "In-browser multi-agent runtime kernel")]
struct Cli {
    /// Directory whose files seed the kernel's VFS (agent profiles under agents/).
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,
    /// Path to a kernel.toml config file; defaults are used if absent.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single root agent from the workspace to completion and print its final state.
    Run {
        /// Agent path within the workspace, e.g. agents/writer.md.
        agent: String,
        /// Kickoff input text.
        input: String,
        /// Let this agent's autonomousConfig drive repeated cycles instead of stopping after one.
        #[arg(long)]
        autonomous: bool,
    },
    /// Serve the kernel-invocation surface over WebSocket for a host UI.
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long, default_value = "lan")]
        bind: String,
        #[arg(short, long)]
        token: Option<String>,
        #[arg(long)]
        no_auth: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentkernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let kernel_config = cli
        .config
        .as_ref()
        .map(KernelConfig::load)
        .unwrap_or_default();

    match cli.command {
        Command::Run { agent, input, autonomous } => run_once(&cli.workspace, kernel_config, agent, input, autonomous).await,
        Command::Serve { port, bind, token, no_auth } => {
            agentkernel_gateway::run_cli(&cli.workspace, kernel_config, port, bind, token, no_auth).await
        }
    }
}

/// Builds one kernel over `workspace`, enqueues a single root Activation for
/// `agent_path`, drains the ready queue, then prints the resulting Session's
/// final transcript and status. This is the headless counterpart to the
/// gateway's `kernel.run` RPC method — no WebSocket, no subscribers beyond
/// stdout.
async fn run_once(
    workspace: &Path,
    mut kernel_config: KernelConfig,
    agent_path: String,
    input: String,
    autonomous: bool,
) -> anyhow::Result<()> {
    if autonomous && kernel_config.autonomous_max_cycles == 0 {
        kernel_config.autonomous_max_cycles = 1;
    }

    let vfs: Arc<dyn Vfs> = Arc::new(load_workspace(workspace)?);
    let registry = Arc::new(AgentRegistry::new());
    for path in vfs.get_all_paths().await {
        if path.starts_with("agents/") {
            if let Some(content) = vfs.read(&path).await {
                if let Err(e) = registry.register_from_file(&path, &content) {
                    tracing::warn!(path = %path, error = %e, "skipping malformed agent profile");
                }
            }
        }
    }

    if registry.get(&agent_path).is_none() {
        anyhow::bail!("agent not found in workspace: {agent_path}");
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

    let event_log = Arc::new(open_event_log(&kernel_config)?);
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
        event_log.clone(),
        session_store.clone(),
        registry,
        vfs,
        provider,
        dispatcher,
    );

    let root = Activation::root(agent_path, input);
    let activation_id = root.activation_id.clone();
    scheduler.enqueue(root)?;
    scheduler.run_until_empty().await?;

    match session_store.get(&activation_id).await {
        Some(session) => {
            println!("status: {:?}", session.status);
            println!("tokens: {}", session.token_count);
            for message in &session.messages {
                println!("--- {:?} ---", message.role);
                println!("{}", message.content);
            }
        }
        None => println!("no session recorded for {activation_id}"),
    }

    Ok(())
}

/// Opens the event log journal named by `kernel_config.event_log_path`, or
/// an in-memory-only log if unset — disk persistence is opt-in so tests and
/// ad-hoc runs don't litter the filesystem.
fn open_event_log(kernel_config: &KernelConfig) -> anyhow::Result<agentkernel_core::event_log::EventLog> {
    match &kernel_config.event_log_path {
        Some(path) => Ok(agentkernel_core::event_log::EventLog::open(path)?),
        None => Ok(agentkernel_core::event_log::EventLog::new()),
    }
}

/// Walks `root` and seeds a `MemoryVfs` with every regular file found,
/// relative to `root` with forward slashes — the same workspace-loading
/// convention the gateway binary uses.
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

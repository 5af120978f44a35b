//! agentkernel-gateway — standalone binary serving the kernel's WebSocket
//! surface over a workspace directory on disk.

use agentkernel_core::types::KernelConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentkernel-gateway", about = "Multi-agent kernel WebSocket gateway")]
struct Cli {
    /// Directory whose files seed the kernel's VFS (agent profiles live under agents/).
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,
    /// Path to a kernel.toml config file; defaults are used if absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long, default_value = "lan")]
    bind: String,
    #[arg(short, long)]
    token: Option<String>,
    #[arg(long)]
    no_auth: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentkernel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let kernel_config = cli
        .config
        .as_ref()
        .map(KernelConfig::load)
        .unwrap_or_default();

    agentkernel_gateway::run_cli(&cli.workspace, kernel_config, cli.port, cli.bind, cli.token, cli.no_auth).await
}

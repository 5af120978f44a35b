//! Axum server wiring: a single `/ws` route exposing the `kernel.*` RPC
//! surface over an already-constructed `Scheduler`, plus a `/health` probe.

use crate::auth::ResolvedAuth;
use crate::ws::handle_connection;
use agentkernel_agent::Scheduler;
use agentkernel_core::types::GatewayConfig;
use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Everything a connected WebSocket handler needs: the kernel itself plus
/// the resolved auth policy for this gateway instance.
pub struct GatewayState {
    pub scheduler: Arc<Scheduler>,
    pub auth: ResolvedAuth,
}

/// Binds and serves the gateway until the process is killed. Blocks.
pub async fn serve(state: Arc<GatewayState>, config: &GatewayConfig) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.bind.to_addr(), config.port)
        .parse()
        .expect("invalid bind address");

    info!("agentkernel gateway v{} listening on {}", env!("CARGO_PKG_VERSION"), bind_addr);
    info!("  websocket: ws://{}/ws", bind_addr);
    info!("  auth mode: {:?}", config.auth.mode);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let status = state.scheduler.status().await;
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "kernel": status,
    }))
}

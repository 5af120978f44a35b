//! WebSocket connection handling — one JSON-RPC-shaped protocol.
//!
//! Every connection gets: an `info` push on connect, auth handling (either
//! the `{"token": ...}` shorthand or a `method: "auth"` RPC call), RPC
//! dispatch once authenticated, and a background forwarder that relays every
//! `EventLog` entry as a `log` push for the lifetime of the connection.

use crate::rpc::route_rpc;
use crate::server::GatewayState;
use agentkernel_core::protocol::{EventMessage, IncomingMessage, RpcResponse};
use agentkernel_core::types::AuthMode;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let info = EventMessage::info(env!("CARGO_PKG_VERSION"));
    if let Ok(text) = serde_json::to_string(&info) {
        let _ = tx.send(text);
    }

    let writer_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut event_rx = state.scheduler.event_log.subscribe();
    let event_tx = tx.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(entry) => {
                    let message = EventMessage::log_entry(&entry);
                    if let Ok(text) = serde_json::to_string(&message) {
                        if event_tx.send(text).is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws client fell behind the event log broadcast");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut authenticated = state.auth.mode == AuthMode::None;

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let incoming: IncomingMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                let response = RpcResponse::err("", -32700, format!("parse error: {e}"));
                let _ = send_response(&tx, &response);
                continue;
            }
        };

        match incoming {
            IncomingMessage::Auth { token } => {
                let ok = state.auth.verify_token(token.as_deref()).is_ok();
                authenticated = ok;
                let message = EventMessage::auth_result(ok, (!ok).then_some("invalid token"));
                if let Ok(text) = serde_json::to_string(&message) {
                    let _ = tx.send(text);
                }
            }
            IncomingMessage::Rpc(req) if req.method == "auth" => {
                let token = req.params.get("token").and_then(|v| v.as_str());
                let ok = state.auth.verify_token(token).is_ok();
                authenticated = ok;
                let response = if ok {
                    RpcResponse::ok(req.id, serde_json::json!({ "ok": true }))
                } else {
                    RpcResponse::auth_error(req.id, "invalid token")
                };
                let _ = send_response(&tx, &response);
            }
            IncomingMessage::Rpc(req) if !authenticated => {
                let response = RpcResponse::auth_error(req.id, "not authenticated");
                let _ = send_response(&tx, &response);
            }
            IncomingMessage::Rpc(req) => {
                let response = route_rpc(&state.scheduler, req).await;
                let _ = send_response(&tx, &response);
            }
        }
    }

    forward_task.abort();
    drop(tx);
    let _ = writer_task.await;
}

fn send_response(tx: &tokio::sync::mpsc::UnboundedSender<String>, response: &RpcResponse) -> Result<(), ()> {
    let text = serde_json::to_string(response).map_err(|_| ())?;
    tx.send(text).map_err(|_| ())
}

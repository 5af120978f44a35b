//! Gateway wire protocol: JSON-RPC-shaped request/response plus
//! unsolicited event pushes riding the same WebSocket connection.
//!
//! Wire format:
//!
//! Client → Server (RPC request):
//!   { "id": "req-123", "method": "kernel.enqueue", "params": { "agentId": "agents/w.md", "input": "go" } }
//!
//! Server → Client (RPC response):
//!   { "id": "req-123", "result": { "activationId": "..." } }
//!   { "id": "req-123", "error": { "code": -1, "message": "not found" } }
//!
//! Server → Client (Event push, no id):
//!   { "event": "log", "data": { "id": 42, "activation_id": "...", "type": "tool_call", ... } }
//!
//! Authentication:
//!   { "token": "secret" }  (shorthand)
//!   { "id": "1", "method": "auth", "params": { "token": "secret" } }  (RPC style)

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client → Server: JSON-RPC style
// ---------------------------------------------------------------------------

/// RPC request from client.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Server → Client: RPC response
// ---------------------------------------------------------------------------

/// RPC response to client.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response with a result value.
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    pub fn err(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Shorthand for a method-not-found error.
    pub fn method_not_found(id: impl Into<String>, method: &str) -> Self {
        Self::err(id, -32601, format!("Method not found: {}", method))
    }

    /// Shorthand for an internal error.
    pub fn internal_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::err(id, -32603, message)
    }

    /// Shorthand for an auth error.
    pub fn auth_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::err(id, -32000, message)
    }
}

/// RPC error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Server → Client: Event push
// ---------------------------------------------------------------------------

/// Server-pushed event (no id, no request correlation).
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
    pub event: String,
    pub data: serde_json::Value,
}

impl EventMessage {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Wraps one `EventEntry` from the kernel's `EventLog` as a push event —
    /// the gateway's sole source of unsolicited `kernel.*` traffic.
    pub fn log_entry(entry: &crate::types::EventEntry) -> Self {
        Self::new("log", serde_json::to_value(entry).unwrap_or(serde_json::Value::Null))
    }

    /// Wraps one `SessionChange` projection as a push event, for clients
    /// that want live status/message/token updates without polling
    /// `kernel.status`.
    pub fn session_change(data: serde_json::Value) -> Self {
        Self::new("session", data)
    }

    /// Auth result event (for shorthand auth without RPC id).
    pub fn auth_result(ok: bool, error: Option<&str>) -> Self {
        Self::new("auth", serde_json::json!({ "ok": ok, "error": error }))
    }

    /// Info event (sent on connection).
    pub fn info(version: &str) -> Self {
        Self::new("info", serde_json::json!({ "version": version }))
    }

    /// Pong event.
    pub fn pong() -> Self {
        Self::new("pong", serde_json::json!({}))
    }
}

// ---------------------------------------------------------------------------
// Unified incoming message — handles both RPC and auth shorthand
// ---------------------------------------------------------------------------

/// Unified incoming message. Serde tries RPC first, then Auth shorthand.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    /// Full RPC request: { "id": "...", "method": "...", "params": ... }
    Rpc(RpcRequest),
    /// Auth shorthand: { "token": "..." } or { "token": null }
    Auth { token: Option<String> },
}

//! agentkernel-gateway — the WebSocket surface over a `Scheduler` kernel.
//!
//! Exposes the `kernel.*` JSON-RPC method set on a single `/ws` route,
//! pushing `EventLog` entries to every connected client as unsolicited
//! `{"event": ..., "data": ...}` messages. Bearer-token auth per
//! `AuthConfig`; no auth layer at all when `AuthMode::None`.

pub mod auth;
pub mod cli;
pub mod rpc;
pub mod server;
pub mod ws;

pub use cli::run_cli;
pub use server::{serve, GatewayState};

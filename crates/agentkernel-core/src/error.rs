//! Kernel-internal error taxonomy.
//!
//! Only collaborator failures and kernel-internal faults are raised
//! as `Error`. Tool- and policy-level failures are contained as data (a
//! `tool_result`/`policy_denied` event) and never reach this type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("agent registry parse error at {path}: {message}")]
    RegistryParse { path: String, message: String },

    #[error("vfs error: {0}")]
    Vfs(String),

    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("event log exhausted: {0}")]
    EventLogFull(String),

    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("replay divergence at event {event_id}: {message}")]
    ReplayDivergence { event_id: u64, message: String },

    #[error("auth failed: {reason}")]
    AuthFailed { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn registry_parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RegistryParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }
}

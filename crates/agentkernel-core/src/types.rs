//! Core data model: AgentProfile, Activation, Session shape, ToolCallRecord,
//! EventEntry, Checkpoint, KernelConfig.
//!
//! These are value types shared across the workspace; the mutable wrappers
//! that own them (Session, SessionStore, EventLog) live in the crates that
//! own their respective lifecycles (agentkernel-agent, agentkernel-core).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session/activation identifier — cheaply cloneable.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Message role inside a Session's conversation history.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a Session's `messages` list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on `Role::Tool` messages whose result was an error outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_is_error: Option<bool>,
}

impl Message {
    fn at(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            tool_calls: None,
            tool_call_id: None,
            tool_is_error: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::at(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::at(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::at(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut m = Self::at(Role::Assistant, content);
        m.tool_calls = Some(tool_calls);
        m
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::tool_result_with_error(tool_call_id, content, false)
    }

    pub fn tool_result_with_error(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut m = Self::at(Role::Tool, content);
        m.tool_call_id = Some(tool_call_id.into());
        m.tool_is_error = Some(is_error);
        m
    }
}

/// A tool call emitted by the model mid-stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Tool definition handed to the provider (built-in or declared custom tool).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

/// `ToolCallRecord` — a paired (call, result) unit inside a Session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
    pub result: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Policy execution mode, from an agent's front-matter `safety_mode`/`mode`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    Safe,
    #[default]
    Balanced,
    GlovesOff,
}

/// The boolean permission flags gating specific tool categories.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Permissions {
    #[serde(default)]
    pub spawn_agents: bool,
    #[serde(default)]
    pub edit_agents: bool,
    #[serde(default)]
    pub delete_files: bool,
    #[serde(default)]
    pub web_access: bool,
    #[serde(default)]
    pub signal_parent: bool,
    #[serde(default)]
    pub custom_tools: bool,
}

/// An agent's execution policy, parsed from front-matter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub mode: PolicyMode,
    #[serde(default = "default_glob_all")]
    pub reads: Vec<String>,
    #[serde(default = "default_glob_all")]
    pub writes: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub blocked_tools: Vec<String>,
    #[serde(default)]
    pub gloves_off_triggers: Vec<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

fn default_glob_all() -> Vec<String> {
    vec!["**".to_string()]
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::default(),
            reads: default_glob_all(),
            writes: default_glob_all(),
            allowed_tools: Vec::new(),
            blocked_tools: Vec::new(),
            gloves_off_triggers: Vec::new(),
            permissions: Permissions::default(),
        }
    }
}

/// A declarative custom tool: its invocation is itself a recursive LLM call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub prompt_template: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Scheduler-driven long-running-mission configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AutonomousConfig {
    #[serde(default)]
    pub max_cycles: Option<u32>,
    #[serde(default)]
    pub resume_mission: bool,
    /// `None` defers to `KernelConfig.autonomous_stop_when_complete`; unlike
    /// a plain `bool` this lets an agent that only declares
    /// `seed_task_when_idle: true` avoid accidentally inheriting a `true`
    /// default it never asked for.
    #[serde(default)]
    pub stop_when_complete: Option<bool>,
    #[serde(default)]
    pub seed_task_when_idle: bool,
}

/// An agent, as parsed from a Markdown file with YAML front-matter.
/// Immutable per `content_hash`; a new write produces a new profile value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProfile {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    pub system_prompt: String,
    pub content_hash: String,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub custom_tools: Vec<CustomToolDefinition>,
    #[serde(default)]
    pub autonomous_config: Option<AutonomousConfig>,
}

impl AgentProfile {
    /// Stable id — the profile's own path.
    pub fn id(&self) -> &str {
        &self.path
    }
}

/// Scheduling priority. Higher sorts first; `signal_parent` uses `Human`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal = 0,
    Human = 10,
}

/// One enqueued unit of work for the scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Activation {
    pub activation_id: String,
    pub agent_id: String,
    pub input: String,
    #[serde(default)]
    pub parent_agent_id: Option<String>,
    #[serde(default)]
    pub parent_activation_id: Option<String>,
    pub spawn_depth: u32,
    pub priority: Priority,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Cumulative autonomous-mission cycle count carried forward by
    /// `ActivationLoop`'s reflection seeding, not reset per-Activation like
    /// `spawn_depth` is — a mission's cycle counter must survive the fact
    /// that each reflection cycle is a brand new Activation/Session.
    #[serde(default)]
    pub autonomous_cycles_done: u32,
}

impl Activation {
    pub fn root(agent_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            activation_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            input: input.into(),
            parent_agent_id: None,
            parent_activation_id: None,
            spawn_depth: 0,
            priority: Priority::Normal,
            created_at: chrono::Utc::now(),
            autonomous_cycles_done: 0,
        }
    }

    pub fn child(
        parent: &Activation,
        agent_id: impl Into<String>,
        input: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            activation_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            input: input.into(),
            parent_agent_id: Some(parent.agent_id.clone()),
            parent_activation_id: Some(parent.activation_id.clone()),
            spawn_depth: parent.spawn_depth + 1,
            priority,
            created_at: chrono::Utc::now(),
            autonomous_cycles_done: 0,
        }
    }
}

/// Terminal/non-terminal status of a Session. Only the scheduler mutates this.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Error,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Error | SessionStatus::Aborted
        )
    }
}

/// EventEntry type tag.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Activation,
    ToolCall,
    ToolResult,
    Spawn,
    Signal,
    StreamChunk,
    TokenUpdate,
    Complete,
    Error,
    Warning,
    PolicyDenied,
    WorkflowComplete,
}

/// One append-only EventLog entry. Once appended, immutable; `id` strictly increasing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEntry {
    pub id: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub activation_id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
}

/// A periodic snapshot used by ReplayController to avoid replaying from genesis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_event_id: u64,
    pub taken_at: chrono::DateTime<chrono::Utc>,
    /// Opaque serialized SessionStore + Scheduler counters + registry hash set.
    pub state: serde_json::Value,
}

/// Kernel-wide configuration. Owned by the scheduler; read-only during a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub memory_enabled: bool,
    #[serde(default = "default_min_turns_before_stop")]
    pub min_turns_before_stop: u32,
    #[serde(default)]
    pub force_reflection: bool,
    #[serde(default)]
    pub auto_record_failures: bool,
    #[serde(default = "default_autonomous_max_cycles")]
    pub autonomous_max_cycles: u32,
    #[serde(default)]
    pub autonomous_resume_mission: bool,
    #[serde(default = "default_true")]
    pub autonomous_stop_when_complete: bool,
    #[serde(default)]
    pub autonomous_seed_task_when_idle: bool,
    /// Tool result truncation cap, in characters.
    #[serde(default = "default_tool_result_cap")]
    pub tool_result_cap: usize,
    /// `K` for the Levenshtein nearest-path suggestion on `vfs_read` miss.
    #[serde(default = "default_suggestion_distance")]
    pub suggestion_distance: usize,
    /// Path to a JSONL event-log journal. `None` disables disk persistence
    /// (the default for ephemeral test/CI runs); set to survive a restart.
    #[serde(default)]
    pub event_log_path: Option<String>,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_max_depth() -> u32 {
    5
}
fn default_max_fanout() -> usize {
    8
}
fn default_token_budget() -> u64 {
    1_000_000
}
fn default_model() -> String {
    "claude-opus-4-1-20250805".to_string()
}
fn default_min_turns_before_stop() -> u32 {
    1
}
fn default_autonomous_max_cycles() -> u32 {
    10
}
fn default_true() -> bool {
    true
}
fn default_tool_result_cap() -> usize {
    50_000
}
fn default_suggestion_distance() -> usize {
    3
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_depth: default_max_depth(),
            max_fanout: default_max_fanout(),
            token_budget: default_token_budget(),
            model: default_model(),
            memory_enabled: false,
            min_turns_before_stop: default_min_turns_before_stop(),
            force_reflection: false,
            auto_record_failures: false,
            autonomous_max_cycles: default_autonomous_max_cycles(),
            autonomous_resume_mission: false,
            autonomous_stop_when_complete: default_true(),
            autonomous_seed_task_when_idle: false,
            tool_result_cap: default_tool_result_cap(),
            suggestion_distance: default_suggestion_distance(),
            event_log_path: None,
        }
    }
}

/// Gateway transport configuration — the kernel-invocation surface's bind/auth
/// knobs. Not part of the kernel's own wire contracts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub bind: BindMode,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_gateway_port() -> u16 {
    18789
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: BindMode::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Bind mode for the gateway listener.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }
}

/// Authentication configuration for the gateway's bearer-token auth method.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    pub token: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    None,
}

/// Observable kernel counters, surfaced over the invocation transport.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct KernelStatus {
    pub is_running: bool,
    pub is_paused: bool,
    pub total_tokens: u64,
    pub active_count: usize,
    pub queue_count: usize,
    pub is_autonomous: bool,
    pub current_cycle: u32,
    pub max_cycles: u32,
}

impl KernelConfig {
    /// Load from a TOML file, falling back to defaults (with a warning) on
    /// missing file or parse failure.
    pub fn load(path: impl AsRef<std::path::Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<KernelConfig>(&raw) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "loaded kernel config");
                    cfg
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to parse kernel config, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::info!(path = %path.display(), error = %err, "no kernel config found, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

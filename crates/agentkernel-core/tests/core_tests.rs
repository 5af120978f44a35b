//! Tests for agentkernel-core: data model, error taxonomy, wire protocol, EventLog.

use agentkernel_core::*;

// ===========================================================================
// SessionKey
// ===========================================================================

#[test]
fn session_key_new_and_display() {
    let key = SessionKey::new("abc-123");
    assert_eq!(key.as_str(), "abc-123");
    assert_eq!(format!("{}", key), "abc-123");
}

#[test]
fn session_key_clone_is_cheap() {
    let key = SessionKey::new("test");
    let cloned = key.clone();
    assert_eq!(key, cloned);
}

#[test]
fn session_key_from_string() {
    let key: SessionKey = "hello".into();
    assert_eq!(key.as_str(), "hello");
    let key2: SessionKey = String::from("world").into();
    assert_eq!(key2.as_str(), "world");
}

#[test]
fn session_key_equality_and_hash() {
    use std::collections::HashSet;
    let a = SessionKey::new("same");
    let b = SessionKey::new("same");
    let c = SessionKey::new("different");
    assert_eq!(a, b);
    assert_ne!(a, c);
    let mut set = HashSet::new();
    set.insert(a.clone());
    assert!(set.contains(&b));
    assert!(!set.contains(&c));
}

// ===========================================================================
// Role / Message
// ===========================================================================

#[test]
fn role_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""assistant""#);
    assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
}

#[test]
fn message_constructors() {
    let sys = Message::system("You are helpful");
    assert_eq!(sys.role, Role::System);
    assert!(sys.tool_calls.is_none());

    let user = Message::user("Hello");
    assert_eq!(user.role, Role::User);

    let assistant = Message::assistant("Hi there");
    assert_eq!(assistant.role, Role::Assistant);

    let tool_result = Message::tool_result("tc-123", "file contents");
    assert_eq!(tool_result.role, Role::Tool);
    assert_eq!(tool_result.tool_call_id.as_deref(), Some("tc-123"));
}

#[test]
fn message_assistant_with_tools_carries_calls() {
    let calls = vec![ToolCall {
        id: "tc-1".into(),
        name: "vfs_read".into(),
        arguments: r#"{"path":"/a.txt"}"#.into(),
    }];
    let msg = Message::assistant_with_tools("", calls.clone());
    assert_eq!(msg.tool_calls.unwrap().len(), 1);
}

#[test]
fn message_tool_calls_skipped_when_none() {
    let msg = Message::user("hi");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(!json.contains("tool_calls"));
    assert!(!json.contains("tool_call_id"));
}

// ===========================================================================
// PolicyConfig defaults
// ===========================================================================

#[test]
fn policy_config_default_globs_are_open() {
    let config = PolicyConfig::default();
    assert_eq!(config.mode, PolicyMode::Balanced);
    assert_eq!(config.reads, vec!["**".to_string()]);
    assert_eq!(config.writes, vec!["**".to_string()]);
}

// ===========================================================================
// AgentProfile / Activation
// ===========================================================================

#[test]
fn agent_profile_id_is_its_path() {
    let profile = AgentProfile {
        path: "agents/researcher.md".into(),
        name: "researcher".into(),
        model: None,
        system_prompt: "You research things.".into(),
        content_hash: "deadbeef".into(),
        policy: PolicyConfig::default(),
        custom_tools: Vec::new(),
        autonomous_config: None,
    };
    assert_eq!(profile.id(), "agents/researcher.md");
}

#[test]
fn activation_root_has_zero_depth_and_no_parent() {
    let act = Activation::root("researcher", "find the bug");
    assert_eq!(act.spawn_depth, 0);
    assert!(act.parent_agent_id.is_none());
    assert!(act.parent_activation_id.is_none());
    assert_eq!(act.priority, Priority::Normal);
}

#[test]
fn activation_child_increments_depth_and_links_parent() {
    let parent = Activation::root("researcher", "find the bug");
    let child = Activation::child(&parent, "fixer", "patch it", Priority::Normal);
    assert_eq!(child.spawn_depth, 1);
    assert_eq!(child.parent_agent_id.as_deref(), Some("researcher"));
    assert_eq!(child.parent_activation_id.as_deref(), Some(parent.activation_id.as_str()));
}

#[test]
fn session_status_terminal_classification() {
    assert!(SessionStatus::Completed.is_terminal());
    assert!(SessionStatus::Error.is_terminal());
    assert!(SessionStatus::Aborted.is_terminal());
    assert!(!SessionStatus::Queued.is_terminal());
    assert!(!SessionStatus::Running.is_terminal());
    assert!(!SessionStatus::Paused.is_terminal());
}

// ===========================================================================
// KernelConfig
// ===========================================================================

#[test]
fn kernel_config_defaults() {
    let config = KernelConfig::default();
    assert_eq!(config.max_concurrency, 4);
    assert_eq!(config.max_depth, 5);
    assert_eq!(config.tool_result_cap, 50_000);
}

#[test]
fn kernel_config_to_toml_roundtrip() {
    let config = KernelConfig::default();
    let toml_str = config.to_toml();
    let back: KernelConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(back.max_concurrency, config.max_concurrency);
}

#[test]
fn kernel_config_load_missing_file_falls_back_to_default() {
    let config = KernelConfig::load("/nonexistent/path/kernel.toml");
    assert_eq!(config.max_concurrency, KernelConfig::default().max_concurrency);
}

// ===========================================================================
// GatewayConfig / BindMode / AuthConfig
// ===========================================================================

#[test]
fn gateway_config_defaults() {
    let config = GatewayConfig::default();
    assert_eq!(config.port, 18789);
    assert!(matches!(config.bind, BindMode::Lan));
    assert!(matches!(config.auth.mode, AuthMode::Token));
}

#[test]
fn bind_mode_to_addr() {
    assert_eq!(BindMode::Loopback.to_addr(), "127.0.0.1");
    assert_eq!(BindMode::Lan.to_addr(), "0.0.0.0");
}

// ===========================================================================
// RPC Protocol
// ===========================================================================

#[test]
fn rpc_request_parse_kernel_enqueue() {
    let json = r#"{"id":"req-1","method":"kernel.enqueue","params":{"agentId":"researcher","input":"go"}}"#;
    let req: RpcRequest = serde_json::from_str(json).unwrap();
    assert_eq!(req.id, "req-1");
    assert_eq!(req.method, "kernel.enqueue");
    assert_eq!(req.params["agentId"], "researcher");
}

#[test]
fn rpc_request_parse_no_params() {
    let json = r#"{"id":"req-2","method":"kernel.status"}"#;
    let req: RpcRequest = serde_json::from_str(json).unwrap();
    assert!(req.params.is_null());
}

#[test]
fn rpc_response_ok_omits_error() {
    let resp = RpcResponse::ok("req-1", serde_json::json!({"ok": true}));
    let json = serde_json::to_string(&resp).unwrap();
    assert!(json.contains(r#""id":"req-1""#));
    assert!(!json.contains(r#""error""#));
}

#[test]
fn rpc_response_method_not_found() {
    let resp = RpcResponse::method_not_found("req-1", "foo.bar");
    let json = serde_json::to_string(&resp).unwrap();
    assert!(json.contains("foo.bar"));
    assert!(json.contains("-32601"));
}

#[test]
fn rpc_response_auth_error() {
    let resp = RpcResponse::auth_error("req-1", "bad token");
    let json = serde_json::to_string(&resp).unwrap();
    assert!(json.contains("bad token"));
    assert!(json.contains("-32000"));
}

#[test]
fn event_message_info_carries_version() {
    let evt = EventMessage::info("0.1.0");
    let json = serde_json::to_string(&evt).unwrap();
    assert!(json.contains(r#""event":"info""#));
    assert!(json.contains("0.1.0"));
}

#[test]
fn event_message_auth_result_carries_error() {
    let evt = EventMessage::auth_result(false, Some("invalid token"));
    let json = serde_json::to_string(&evt).unwrap();
    assert!(json.contains(r#""event":"auth""#));
    assert!(json.contains("invalid token"));
}

#[test]
fn incoming_message_parses_rpc_and_auth_shorthand() {
    let rpc: IncomingMessage =
        serde_json::from_str(r#"{"id":"req-1","method":"kernel.status"}"#).unwrap();
    assert!(matches!(rpc, IncomingMessage::Rpc(_)));

    let auth: IncomingMessage = serde_json::from_str(r#"{"token":"secret"}"#).unwrap();
    match auth {
        IncomingMessage::Auth { token } => assert_eq!(token.as_deref(), Some("secret")),
        _ => panic!("expected Auth"),
    }
}

// ===========================================================================
// Error
// ===========================================================================

#[test]
fn error_auth_failed() {
    let e = Error::auth_failed("bad creds");
    assert!(e.to_string().contains("bad creds"));
    assert!(matches!(e, Error::AuthFailed { .. }));
}

#[test]
fn error_provider() {
    let e = Error::provider("anthropic", "rate limited");
    assert!(e.to_string().contains("anthropic"));
    assert!(e.to_string().contains("rate limited"));
}

#[test]
fn error_registry_parse() {
    let e = Error::registry_parse("agents/broken.md", "missing front-matter");
    assert!(e.to_string().contains("agents/broken.md"));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let e: Error = io_err.into();
    assert!(matches!(e, Error::Io(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let e: Error = json_err.into();
    assert!(matches!(e, Error::Json(_)));
}

#[test]
fn error_display_all_variants() {
    let errors: Vec<Error> = vec![
        Error::AuthFailed { reason: "x".into() },
        Error::SessionNotFound("x".into()),
        Error::AgentNotFound("x".into()),
        Error::Config("x".into()),
        Error::EventLogFull("x".into()),
        Error::BudgetExhausted("x".into()),
        Error::ReplayDivergence { event_id: 1, message: "x".into() },
        Error::Vfs("x".into()),
        Error::Internal("x".into()),
    ];
    for e in errors {
        let _ = format!("{}", e);
    }
}

// ===========================================================================
// EventLog
// ===========================================================================

#[test]
fn event_log_monotonic_ids_and_since() {
    let log = EventLog::new();
    let a = log
        .append("act1", "agent1", EventType::Activation, serde_json::json!({}))
        .unwrap();
    let b = log
        .append("act1", "agent1", EventType::Complete, serde_json::json!({}))
        .unwrap();
    assert!(b > a);
    assert_eq!(log.since(a).len(), 1);
    assert_eq!(log.snapshot().len(), 2);
}

#[tokio::test]
async fn event_log_broadcasts_to_subscribers() {
    let log = EventLog::new();
    let mut rx = log.subscribe();
    log.append("act1", "agent1", EventType::Activation, serde_json::json!({}))
        .unwrap();
    let entry = rx.recv().await.unwrap();
    assert_eq!(entry.event_type, EventType::Activation);
}

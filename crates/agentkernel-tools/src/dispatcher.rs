//! ToolDispatcher: the closed built-in tool set plus declarative
//! custom-tool execution. Gating (PolicyGate) happens upstream, in the
//! ActivationLoop — by the time a call reaches `dispatch`, it has already
//! been allowed or escalated. `dispatch` never raises: every failure mode
//! becomes a `ToolOutcome` whose body carries a machine-readable
//! `"Error: …"` prefix.

use crate::custom_tool::run_custom_tool;
use crate::web::WebAccess;
use agentkernel_core::types::{Activation, AgentProfile};
use agentkernel_core::KernelHandle;
use agentkernel_llm::ProviderAdapter;
use agentkernel_registry::AgentRegistry;
use agentkernel_vfs::{matches_prefix_or_glob, nearest_paths, Vfs};
use std::sync::Arc;

const DEFAULT_TOOL_RESULT_CAP: usize = 50_000;
const DEFAULT_SUGGESTION_DISTANCE: usize = 3;
const SUGGESTION_LIMIT: usize = 3;

/// Result of one dispatched call. `extra_output_tokens` is non-zero only
/// for custom tools, whose recursive provider call burns budget the caller
/// must fold into the session's `tokenCount`.
pub struct ToolOutcome {
    pub result: String,
    pub is_error: bool,
    pub extra_output_tokens: u32,
}

impl ToolOutcome {
    fn ok(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            is_error: false,
            extra_output_tokens: 0,
        }
    }

    fn err(result: impl Into<String>) -> Self {
        let body = result.into();
        Self {
            result: format!("Error: {body}"),
            is_error: true,
            extra_output_tokens: 0,
        }
    }
}

pub struct ToolDispatcher {
    vfs: Arc<dyn Vfs>,
    registry: Arc<AgentRegistry>,
    provider: Arc<ProviderAdapter>,
    web: Arc<dyn WebAccess>,
    tool_result_cap: usize,
    suggestion_distance: usize,
}

impl ToolDispatcher {
    pub fn new(
        vfs: Arc<dyn Vfs>,
        registry: Arc<AgentRegistry>,
        provider: Arc<ProviderAdapter>,
        web: Arc<dyn WebAccess>,
    ) -> Self {
        Self {
            vfs,
            registry,
            provider,
            web,
            tool_result_cap: DEFAULT_TOOL_RESULT_CAP,
            suggestion_distance: DEFAULT_SUGGESTION_DISTANCE,
        }
    }

    pub fn with_limits(mut self, tool_result_cap: usize, suggestion_distance: usize) -> Self {
        self.tool_result_cap = tool_result_cap;
        self.suggestion_distance = suggestion_distance;
        self
    }

    /// Shared registry backing this dispatcher's `vfs_write`/`vfs_delete`
    /// hot-reload behavior — exposed so callers can inspect profile state
    /// without re-deriving it from tool output.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// The fixed built-in names — anything else is a declared custom tool.
    pub fn builtin_names() -> &'static [&'static str] {
        &[
            "vfs_read",
            "vfs_write",
            "vfs_list",
            "vfs_delete",
            "spawn_agent",
            "signal_parent",
            "web_search",
            "web_fetch",
        ]
    }

    pub async fn dispatch(
        &self,
        profile: &AgentProfile,
        activation: &Activation,
        tool_name: &str,
        args: &serde_json::Value,
        kernel: &dyn KernelHandle,
    ) -> ToolOutcome {
        let outcome = match tool_name {
            "vfs_read" => self.vfs_read(args).await,
            "vfs_write" => self.vfs_write(args).await,
            "vfs_list" => self.vfs_list(args).await,
            "vfs_delete" => self.vfs_delete(args).await,
            "spawn_agent" => self.spawn_agent(activation, args, kernel).await,
            "signal_parent" => self.signal_parent(activation, args, kernel).await,
            "web_search" => self.web_search(args).await,
            "web_fetch" => self.web_fetch(args).await,
            other => self.custom_tool(profile, other, args).await,
        };
        self.truncate(outcome)
    }

    fn truncate(&self, mut outcome: ToolOutcome) -> ToolOutcome {
        if outcome.result.len() > self.tool_result_cap {
            let mut cut = self.tool_result_cap;
            while !outcome.result.is_char_boundary(cut) {
                cut -= 1;
            }
            outcome.result = format!(
                "{}...\n[truncated, {} total chars]",
                &outcome.result[..cut],
                outcome.result.len()
            );
        }
        outcome
    }

    async fn vfs_read(&self, args: &serde_json::Value) -> ToolOutcome {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'path'");
        };
        match self.vfs.read(path).await {
            Some(content) => ToolOutcome::ok(content),
            None => {
                let all_paths = self.vfs.get_all_paths().await;
                let suggestions =
                    nearest_paths(path, &all_paths, self.suggestion_distance, SUGGESTION_LIMIT);
                if suggestions.is_empty() {
                    ToolOutcome::ok(format!("not found: {path}"))
                } else {
                    ToolOutcome::ok(format!(
                        "not found: {path}\nDid you mean:\n{}",
                        suggestions.join("\n")
                    ))
                }
            }
        }
    }

    async fn vfs_write(&self, args: &serde_json::Value) -> ToolOutcome {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'path'");
        };
        let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'content'");
        };
        match self.vfs.write(path, content.to_string()).await {
            Ok(()) => {
                if path.starts_with("agents/") {
                    if let Err(e) = self.registry.register_from_file(path, content) {
                        return ToolOutcome::err(format!(
                            "written, but failed to register agent profile: {e}"
                        ));
                    }
                }
                ToolOutcome::ok(format!("Written to {path}"))
            }
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }

    async fn vfs_list(&self, args: &serde_json::Value) -> ToolOutcome {
        let prefix = args
            .get("prefix")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let all_paths = self.vfs.get_all_paths().await;
        let mut matches: Vec<&String> = all_paths
            .iter()
            .filter(|p| matches_prefix_or_glob(prefix, p))
            .collect();
        matches.sort();
        if matches.is_empty() {
            if all_paths.is_empty() {
                ToolOutcome::ok("No files match")
            } else {
                let mut known: Vec<&String> = all_paths.iter().collect();
                known.sort();
                ToolOutcome::ok(format!(
                    "No files match\nKnown prefixes:\n{}",
                    known
                        .into_iter()
                        .take(10)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join("\n")
                ))
            }
        } else {
            ToolOutcome::ok(
                matches
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
    }

    async fn vfs_delete(&self, args: &serde_json::Value) -> ToolOutcome {
        let Some(path) = args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'path'");
        };
        match self.vfs.delete(path).await {
            Ok(true) => {
                if path.starts_with("agents/") {
                    self.registry.unregister(path);
                }
                ToolOutcome::ok(format!("Deleted {path}"))
            }
            Ok(false) => ToolOutcome::ok(format!("not found: {path}")),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }

    async fn spawn_agent(
        &self,
        activation: &Activation,
        args: &serde_json::Value,
        kernel: &dyn KernelHandle,
    ) -> ToolOutcome {
        let Some(filename) = args.get("filename").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'filename'");
        };
        let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'content'");
        };
        let task = args
            .get("task")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let novelty_override = args
            .get("novelty_override")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match kernel
            .spawn_child(
                activation,
                filename.to_string(),
                content.to_string(),
                task,
                novelty_override,
            )
            .await
        {
            Ok(activation_id) => {
                ToolOutcome::ok(format!("Created and activated (activation {activation_id})"))
            }
            Err(e) => ToolOutcome::ok(format!("not spawned: {e}")),
        }
    }

    async fn signal_parent(
        &self,
        activation: &Activation,
        args: &serde_json::Value,
        kernel: &dyn KernelHandle,
    ) -> ToolOutcome {
        let Some(message) = args.get("message").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'message'");
        };
        match kernel
            .signal_parent(
                activation.parent_agent_id.as_deref(),
                activation.parent_activation_id.as_deref(),
                message.to_string(),
            )
            .await
        {
            Ok(()) => ToolOutcome::ok("Message sent"),
            Err(e) => ToolOutcome::ok(e),
        }
    }

    async fn web_search(&self, args: &serde_json::Value) -> ToolOutcome {
        let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'query'");
        };
        match self.web.search(query).await {
            Ok(text) => ToolOutcome::ok(text),
            Err(e) => ToolOutcome::err(e),
        }
    }

    async fn web_fetch(&self, args: &serde_json::Value) -> ToolOutcome {
        let Some(url) = args.get("url").and_then(|v| v.as_str()) else {
            return ToolOutcome::err("missing required argument 'url'");
        };
        match self.web.fetch(url).await {
            Ok(text) => ToolOutcome::ok(text),
            Err(e) => ToolOutcome::err(e),
        }
    }

    async fn custom_tool(
        &self,
        profile: &AgentProfile,
        name: &str,
        args: &serde_json::Value,
    ) -> ToolOutcome {
        let Some(definition) = profile.custom_tools.iter().find(|t| t.name == name) else {
            tracing::warn!(agent = %profile.path, tool = name, "model called an undeclared tool");
            return ToolOutcome::err(format!("unknown tool '{name}'"));
        };
        let fallback_model = profile.model.clone().unwrap_or_default();
        match run_custom_tool(definition, args, &self.provider, &fallback_model).await {
            Ok((text, tokens)) => {
                let mut outcome = ToolOutcome::ok(text);
                outcome.extra_output_tokens = tokens;
                outcome
            }
            Err(e) => ToolOutcome::err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentkernel_core::handle::SpawnError as CoreSpawnError;
    use agentkernel_llm::MockProvider;
    use agentkernel_vfs::MemoryVfs;

    struct NoopKernel;

    #[async_trait::async_trait]
    impl KernelHandle for NoopKernel {
        async fn spawn_child(
            &self,
            _parent: &Activation,
            _filename: String,
            _content: String,
            _task: String,
            _novelty_override: bool,
        ) -> Result<String, agentkernel_core::handle::SpawnError> {
            Err(agentkernel_core::handle::SpawnError::FanoutLimit { max_fanout: 1 })
        }

        async fn signal_parent(
            &self,
            _parent_agent_id: Option<&str>,
            _parent_activation_id: Option<&str>,
            _message: String,
        ) -> Result<(), String> {
            Err("no parent".to_string())
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let vfs = Arc::new(MemoryVfs::new());
        let registry = Arc::new(AgentRegistry::new());
        let provider = Arc::new(ProviderAdapter::new(Arc::new(MockProvider::repeating(vec![]))));
        let web = Arc::new(crate::web::ReqwestWebAccess::new());
        ToolDispatcher::new(vfs, registry, provider, web)
    }

    fn profile() -> AgentProfile {
        AgentProfile {
            path: "agents/test.md".into(),
            name: "Test".into(),
            model: None,
            system_prompt: String::new(),
            content_hash: "h".into(),
            policy: Default::default(),
            custom_tools: Vec::new(),
            autonomous_config: None,
        }
    }

    #[tokio::test]
    async fn vfs_read_missing_path_suggests_nearest() {
        let d = dispatcher();
        d.vfs
            .write("agents/writer.md", "content".to_string())
            .await
            .unwrap();
        let kernel = NoopKernel;
        let outcome = d
            .dispatch(
                &profile(),
                &Activation::root("agents/test.md", "go"),
                "vfs_read",
                &serde_json::json!({"path": "agents/writter.md"}),
                &kernel,
            )
            .await;
        assert!(!outcome.is_error);
        assert!(outcome.result.contains("agents/writer.md"));
    }

    #[tokio::test]
    async fn vfs_write_under_agents_registers_profile() {
        let d = dispatcher();
        let kernel = NoopKernel;
        let content = "---\nname: Child\n---\nDo things.\n";
        let outcome = d
            .dispatch(
                &profile(),
                &Activation::root("agents/test.md", "go"),
                "vfs_write",
                &serde_json::json!({"path": "agents/child.md", "content": content}),
                &kernel,
            )
            .await;
        assert!(!outcome.is_error);
        assert!(d.registry.get("agents/child.md").is_some());
    }

    #[tokio::test]
    async fn spawn_agent_surfaces_fanout_denial_without_erroring() {
        let d = dispatcher();
        let kernel = NoopKernel;
        let outcome = d
            .dispatch(
                &profile(),
                &Activation::root("agents/test.md", "go"),
                "spawn_agent",
                &serde_json::json!({"filename": "c.md", "content": "---\n---\nhi", "task": "t"}),
                &kernel,
            )
            .await;
        assert!(!outcome.is_error);
        assert!(outcome.result.contains("fanout"));
    }

    #[tokio::test]
    async fn signal_parent_without_parent_is_narrative_not_error() {
        let d = dispatcher();
        let kernel = NoopKernel;
        let outcome = d
            .dispatch(
                &profile(),
                &Activation::root("agents/test.md", "go"),
                "signal_parent",
                &serde_json::json!({"message": "done"}),
                &kernel,
            )
            .await;
        assert!(!outcome.is_error);
        assert!(outcome.result.contains("no parent"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let d = dispatcher();
        let kernel = NoopKernel;
        let outcome = d
            .dispatch(
                &profile(),
                &Activation::root("agents/test.md", "go"),
                "not_a_real_tool",
                &serde_json::json!({}),
                &kernel,
            )
            .await;
        assert!(outcome.is_error);
        assert!(outcome.result.starts_with("Error:"));
    }

    #[test]
    fn core_spawn_error_display_mentions_limit_kind() {
        let e = CoreSpawnError::DepthLimit { max_depth: 3 };
        assert!(e.to_string().contains("depth limit"));
    }
}

//! PolicyGate: a pure function `(profile, toolName, args, context) →
//! Allow | Deny(reason) | Escalate(triggered_by)`.

use agentkernel_core::types::{AgentProfile, PolicyMode};
use agentkernel_vfs::{build_glob_set, matches_any};

/// Built-in tools that carry no explicit `blockedTools`/`allowedTools`
/// listing of their own but are still subject to the closed set — anything
/// outside this list is a declared custom tool, gated by `customTools`.
const BUILTIN_TOOLS: &[&str] = &[
    "vfs_read",
    "vfs_write",
    "vfs_list",
    "vfs_delete",
    "spawn_agent",
    "signal_parent",
    "web_search",
    "web_fetch",
];

/// The current Activation's input — the only context PolicyGate needs
/// beyond the profile and the call itself, since gloves-off triggers match
/// against the kickoff text, not the tool args.
pub struct PolicyContext {
    pub input: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
    Escalate { triggered_by: String },
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

/// Evaluates the five ordered rules against one proposed tool call.
pub fn evaluate(
    profile: &AgentProfile,
    tool_name: &str,
    args: &serde_json::Value,
    context: &PolicyContext,
) -> PolicyDecision {
    let policy = &profile.policy;

    // Rule 1: explicit block.
    if policy.blocked_tools.iter().any(|t| t == tool_name) {
        return PolicyDecision::Deny {
            reason: format!("tool '{tool_name}' is blocked by policy"),
        };
    }

    // Rule 2: non-empty allow-list is exhaustive.
    if !policy.allowed_tools.is_empty() && !policy.allowed_tools.iter().any(|t| t == tool_name) {
        return PolicyDecision::Deny {
            reason: format!("tool '{tool_name}' is not in allowedTools"),
        };
    }

    // Rule 3: path scope.
    if let Some(path) = extract_path(tool_name, args) {
        let glob_list = match tool_name {
            "vfs_read" | "vfs_list" => &policy.reads,
            "vfs_write" | "vfs_delete" | "spawn_agent" => &policy.writes,
            _ => &policy.reads,
        };
        if !matches_any(&build_glob_set(glob_list), &path) {
            return PolicyDecision::Deny {
                reason: format!("path '{path}' is outside the agent's policy scope"),
            };
        }
    }

    // Rule 4: permission-flag gating.
    let is_custom_tool = !BUILTIN_TOOLS.contains(&tool_name);
    let (flag_name, flag_value) = if is_custom_tool {
        ("custom_tools", policy.permissions.custom_tools)
    } else {
        match required_permission(tool_name, &policy.permissions) {
            Some(gated) => gated,
            // vfs_read / vfs_write / vfs_list carry no permission flag —
            // scope (rule 3) is their only gate.
            None => return PolicyDecision::Allow,
        }
    };

    // Rule 5: mode gate.
    match policy.mode {
        PolicyMode::Safe => PolicyDecision::Deny {
            reason: format!("'{tool_name}' is a destructive operation, forbidden in safe mode"),
        },
        PolicyMode::Balanced => {
            if flag_value {
                PolicyDecision::Allow
            } else {
                PolicyDecision::Deny {
                    reason: format!("'{tool_name}' requires permission '{flag_name}' which is not granted"),
                }
            }
        }
        PolicyMode::GlovesOff => {
            if flag_value {
                return PolicyDecision::Allow;
            }
            match policy
                .gloves_off_triggers
                .iter()
                .find(|trigger| context.input.contains(trigger.as_str()))
            {
                Some(trigger) => PolicyDecision::Escalate {
                    triggered_by: trigger.clone(),
                },
                None => PolicyDecision::Deny {
                    reason: format!(
                        "'{tool_name}' requires permission '{flag_name}'; no gloves_off trigger matched"
                    ),
                },
            }
        }
    }
}

fn required_permission(
    tool_name: &str,
    permissions: &agentkernel_core::types::Permissions,
) -> Option<(&'static str, bool)> {
    match tool_name {
        "vfs_delete" => Some(("delete_files", permissions.delete_files)),
        "spawn_agent" => Some(("spawn_agents", permissions.spawn_agents)),
        "web_search" | "web_fetch" => Some(("web_access", permissions.web_access)),
        "signal_parent" => Some(("signal_parent", permissions.signal_parent)),
        _ => None,
    }
}

fn extract_path(tool_name: &str, args: &serde_json::Value) -> Option<String> {
    match tool_name {
        "vfs_read" | "vfs_write" | "vfs_delete" => {
            args.get("path").and_then(|v| v.as_str()).map(String::from)
        }
        "vfs_list" => args.get("prefix").and_then(|v| v.as_str()).map(String::from),
        "spawn_agent" => args
            .get("filename")
            .and_then(|v| v.as_str())
            .map(|f| format!("agents/{f}")),
        _ => None,
    }
}

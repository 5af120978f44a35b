//! Markdown + YAML front-matter parser → `AgentProfile`.

use agentkernel_core::types::{
    AgentProfile, AutonomousConfig, CustomToolDefinition, Permissions, PolicyConfig, PolicyMode,
};
use agentkernel_core::{Error, Result};
use sha2::{Digest, Sha256};

const KNOWN_KEYS: &[&str] = &[
    "name",
    "model",
    "safety_mode",
    "mode",
    "reads",
    "writes",
    "allowed_tools",
    "blocked_tools",
    "gloves_off_triggers",
    "permissions",
    "tools",
    "autonomous",
];

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct FrontMatter {
    name: Option<String>,
    model: Option<String>,
    #[serde(alias = "safety_mode")]
    mode: PolicyMode,
    reads: Option<Vec<String>>,
    writes: Option<Vec<String>>,
    allowed_tools: Vec<String>,
    blocked_tools: Vec<String>,
    gloves_off_triggers: Vec<String>,
    permissions: Permissions,
    tools: Vec<CustomToolDefinition>,
    autonomous: Option<AutonomousConfig>,
}

/// Parses a Markdown-with-front-matter agent file into an `AgentProfile`.
/// `path` becomes the profile's stable id; `raw` is hashed verbatim for
/// `content_hash` so any byte change (including whitespace) rotates the hash.
pub fn parse_agent_file(path: &str, raw: &str) -> Result<AgentProfile> {
    let (front_matter_raw, body) = split_front_matter(raw)
        .ok_or_else(|| Error::registry_parse(path, "missing YAML front-matter delimiters (---)"))?;

    warn_on_unknown_keys(path, &front_matter_raw);

    let fm: FrontMatter = if front_matter_raw.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str(&front_matter_raw)
            .map_err(|e| Error::registry_parse(path, e.to_string()))?
    };

    let name = fm.name.unwrap_or_else(|| default_name_from_path(path));

    let policy = PolicyConfig {
        mode: fm.mode,
        reads: fm.reads.unwrap_or_else(|| vec!["**".to_string()]),
        writes: fm.writes.unwrap_or_else(|| vec!["**".to_string()]),
        allowed_tools: fm.allowed_tools,
        blocked_tools: fm.blocked_tools,
        gloves_off_triggers: fm.gloves_off_triggers,
        permissions: fm.permissions,
    };

    Ok(AgentProfile {
        path: path.to_string(),
        name,
        model: fm.model,
        system_prompt: body.trim().to_string(),
        content_hash: hash_content(raw),
        policy,
        custom_tools: fm.tools,
        autonomous_config: fm.autonomous,
    })
}

/// Splits on the leading `---`/`---` delimiter pair. Only a line consisting
/// of exactly `---` closes the block, so a markdown horizontal rule deeper
/// in the body can't be mistaken for it.
fn split_front_matter(raw: &str) -> Option<(String, String)> {
    let mut lines = raw.lines();
    let first = lines.next()?;
    if first.trim_end_matches('\r') != "---" {
        return None;
    }

    let mut front_matter_lines = Vec::new();
    let mut body_lines = Vec::new();
    let mut closed = false;
    for line in lines {
        if !closed && line.trim_end_matches('\r') == "---" {
            closed = true;
            continue;
        }
        if closed {
            body_lines.push(line);
        } else {
            front_matter_lines.push(line);
        }
    }

    if !closed {
        return None;
    }
    Some((front_matter_lines.join("\n"), body_lines.join("\n")))
}

fn warn_on_unknown_keys(path: &str, front_matter_raw: &str) {
    let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(front_matter_raw)
    else {
        return;
    };
    for key in map.keys() {
        if let Some(key_str) = key.as_str() {
            if !KNOWN_KEYS.contains(&key_str) {
                tracing::warn!(path, key = key_str, "ignoring unknown agent front-matter key");
            }
        }
    }
}

fn default_name_from_path(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

fn hash_content(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "---\nname: W\nmode: safe\n---\nEcho input\n";

    #[test]
    fn parses_name_mode_and_body() {
        let profile = parse_agent_file("agents/writer.md", SIMPLE).unwrap();
        assert_eq!(profile.name, "W");
        assert_eq!(profile.policy.mode, PolicyMode::Safe);
        assert_eq!(profile.system_prompt, "Echo input");
    }

    #[test]
    fn safety_mode_alias_accepted() {
        let raw = "---\nsafety_mode: gloves_off\n---\nGo wild.\n";
        let profile = parse_agent_file("agents/x.md", raw).unwrap();
        assert_eq!(profile.policy.mode, PolicyMode::GlovesOff);
    }

    #[test]
    fn missing_delimiters_is_an_error() {
        let result = parse_agent_file("agents/x.md", "no front matter here");
        assert!(result.is_err());
    }

    #[test]
    fn absent_name_falls_back_to_file_stem() {
        let raw = "---\nmode: balanced\n---\nbody\n";
        let profile = parse_agent_file("agents/fallback-name.md", raw).unwrap();
        assert_eq!(profile.name, "fallback-name");
    }

    #[test]
    fn reads_writes_default_to_open_glob() {
        let profile = parse_agent_file("agents/writer.md", SIMPLE).unwrap();
        assert_eq!(profile.policy.reads, vec!["**".to_string()]);
        assert_eq!(profile.policy.writes, vec!["**".to_string()]);
    }

    #[test]
    fn mode_defaults_to_balanced_when_omitted() {
        let raw = "---\nname: N\n---\nbody\n";
        let profile = parse_agent_file("agents/n.md", raw).unwrap();
        assert_eq!(profile.policy.mode, PolicyMode::Balanced);
    }

    #[test]
    fn content_hash_changes_with_content() {
        let a = parse_agent_file("agents/x.md", SIMPLE).unwrap();
        let b = parse_agent_file("agents/x.md", &format!("{SIMPLE}\nextra")).unwrap();
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn custom_tools_and_autonomous_config_parse() {
        let raw = r#"---
name: Researcher
tools:
  - name: lookup
    description: Look something up
    parameters: {}
    prompt_template: "Find: {{query}}"
autonomous:
  max_cycles: 5
  stop_when_complete: true
---
Body text.
"#;
        let profile = parse_agent_file("agents/researcher.md", raw).unwrap();
        assert_eq!(profile.custom_tools.len(), 1);
        assert_eq!(profile.custom_tools[0].name, "lookup");
        let autonomous = profile.autonomous_config.unwrap();
        assert_eq!(autonomous.max_cycles, Some(5));
        assert_eq!(autonomous.stop_when_complete, Some(true));
    }
}

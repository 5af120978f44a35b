//! AgentRegistry collaborator: lookup by path, register/unregister on
//! VFS writes under `agents/`.

use crate::parser::parse_agent_file;
use agentkernel_core::types::AgentProfile;
use agentkernel_core::Result;
use dashmap::DashMap;

/// Lifetime of an `AgentProfile` = until its file is deleted or rewritten.
/// Hot reload: a rewrite replaces the entry; in-flight activations keep
/// whatever profile value they already captured (they hold a clone, not a
/// reference into this map).
pub struct AgentRegistry {
    profiles: DashMap<String, AgentProfile>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn register_from_file(&self, path: &str, content: &str) -> Result<AgentProfile> {
        let profile = parse_agent_file(path, content)?;
        self.profiles.insert(path.to_string(), profile.clone());
        Ok(profile)
    }

    pub fn unregister(&self, path: &str) -> Option<AgentProfile> {
        self.profiles.remove(path).map(|(_, v)| v)
    }

    pub fn get(&self, path_or_id: &str) -> Option<AgentProfile> {
        self.profiles.get(path_or_id).map(|entry| entry.clone())
    }

    pub fn list_all(&self) -> Vec<AgentProfile> {
        self.profiles.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "---\nname: W\n---\nEcho input\n";

    #[test]
    fn register_then_get_roundtrips() {
        let registry = AgentRegistry::new();
        registry.register_from_file("agents/writer.md", AGENT).unwrap();
        let profile = registry.get("agents/writer.md").unwrap();
        assert_eq!(profile.name, "W");
    }

    #[test]
    fn rewrite_replaces_existing_entry() {
        let registry = AgentRegistry::new();
        registry.register_from_file("agents/writer.md", AGENT).unwrap();
        let rewritten = "---\nname: W2\n---\nEcho input, differently\n";
        registry.register_from_file("agents/writer.md", rewritten).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("agents/writer.md").unwrap().name, "W2");
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = AgentRegistry::new();
        registry.register_from_file("agents/writer.md", AGENT).unwrap();
        let removed = registry.unregister("agents/writer.md");
        assert!(removed.is_some());
        assert!(registry.get("agents/writer.md").is_none());
    }

    #[test]
    fn register_bad_content_does_not_insert() {
        let registry = AgentRegistry::new();
        assert!(registry.register_from_file("agents/bad.md", "no front matter").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn list_all_returns_every_registered_profile() {
        let registry = AgentRegistry::new();
        registry.register_from_file("agents/a.md", AGENT).unwrap();
        registry.register_from_file("agents/b.md", AGENT).unwrap();
        assert_eq!(registry.list_all().len(), 2);
    }
}

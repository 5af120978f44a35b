//! Integration coverage for the AgentRegistry collaborator.

use agentkernel_registry::AgentRegistry;
use agentkernel_core::types::PolicyMode;

#[test]
fn registers_multiple_agents_with_distinct_policies() {
    let registry = AgentRegistry::new();

    registry
        .register_from_file(
            "agents/writer.md",
            "---\nname: Writer\nmode: safe\n---\nEcho input\n",
        )
        .unwrap();

    registry
        .register_from_file(
            "agents/researcher.md",
            "---\nname: Researcher\nmode: balanced\npermissions:\n  web_access: true\n---\nResearch things.\n",
        )
        .unwrap();

    assert_eq!(registry.len(), 2);
    let writer = registry.get("agents/writer.md").unwrap();
    assert_eq!(writer.policy.mode, PolicyMode::Safe);
    let researcher = registry.get("agents/researcher.md").unwrap();
    assert!(researcher.policy.permissions.web_access);
}

#[test]
fn unknown_front_matter_keys_are_ignored_not_fatal() {
    let registry = AgentRegistry::new();
    let raw = "---\nname: W\nfuture_field: 42\n---\nBody.\n";
    let profile = registry.register_from_file("agents/w.md", raw).unwrap();
    assert_eq!(profile.name, "W");
}

//! `KernelHandle` — the narrow interface `agentkernel-tools`' `spawn_agent`
//! and `signal_parent` tools use to reach back into the Scheduler.
//!
//! `agentkernel-tools` cannot depend on `agentkernel-agent` (the Scheduler's
//! crate), since `agentkernel-agent` depends on `agentkernel-tools` for the
//! `ToolDispatcher`. Routing the dependency through this trait, owned by the
//! lowest crate in the graph, breaks the cycle: `agentkernel-agent::Scheduler`
//! implements it, `agentkernel-tools` only borrows a `dyn KernelHandle`.

use crate::types::Activation;
use async_trait::async_trait;

/// Why a `spawn_child` call was refused. Carries enough detail for the tool
/// to return a narrative error string without re-deriving it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpawnError {
    /// `spawnDepth + 1 > maxDepth`.
    DepthLimit { max_depth: u32 },
    /// Current child count for this parent has reached `maxFanout`.
    FanoutLimit { max_fanout: usize },
    /// Same `(agentId, input hash)` already spawned by this parent and no
    /// novelty override was requested.
    Duplicate,
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnError::DepthLimit { max_depth } => {
                write!(f, "depth limit reached (maxDepth={max_depth})")
            }
            SpawnError::FanoutLimit { max_fanout } => {
                write!(f, "fanout limit reached (maxFanout={max_fanout})")
            }
            SpawnError::Duplicate => write!(
                f,
                "a child with this agent and input was already spawned (no novelty override)"
            ),
        }
    }
}

/// What `agentkernel-tools` needs back from the Scheduler: enqueue a child
/// Activation (`spawn_agent`) or re-activate the parent (`signal_parent`).
#[async_trait]
pub trait KernelHandle: Send + Sync {
    /// Validates depth/fanout/novelty, writes `agents/<filename>` via the
    /// VFS, registers the profile, and enqueues a child `Activation` at
    /// `parent.spawn_depth + 1`. Returns the new activation id on success.
    async fn spawn_child(
        &self,
        parent: &Activation,
        filename: String,
        content: String,
        task: String,
        novelty_override: bool,
    ) -> Result<String, SpawnError>;

    /// Enqueues a re-activation of `parent_agent_id`/`parent_activation_id`
    /// with `message` as input, at `Priority::Human`. Returns an error only
    /// when there is no parent (root activations have none).
    async fn signal_parent(
        &self,
        parent_agent_id: Option<&str>,
        parent_activation_id: Option<&str>,
        message: String,
    ) -> Result<(), String>;
}

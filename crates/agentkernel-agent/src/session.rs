//! SessionStore: in-memory `activationId → Session` map with
//! reactive change notification. No external writes — every mutation goes
//! through an explicit method here, which is also where the spawn-novelty
//! dedup set lives, scoped to the parent Session's
//! lifetime.

use agentkernel_core::types::{Activation, Message, Priority, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Mutable per-activation state. Only the scheduler sets `status`; only the
/// activation loop appends messages / streaming text / token count.
///
/// Serializable so `Scheduler::checkpoint_state` can fold a snapshot of every
/// session into a `Checkpoint`'s opaque `state` blob for `ReplayController`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub activation_id: String,
    pub agent_id: String,
    pub parent_agent_id: Option<String>,
    pub parent_activation_id: Option<String>,
    pub spawn_depth: u32,
    pub status: SessionStatus,
    pub messages: Vec<Message>,
    pub streaming_text: String,
    pub token_count: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Provider-opaque continuation state (e.g. thought-signature blobs).
    /// Never interpreted by the kernel, preserved verbatim across turns.
    pub model_side_state: serde_json::Value,
    /// `(childAgentId, inputHash)` pairs already spawned by this session,
    /// unless the spawning call set `novelty_override`.
    pub spawned_children: HashSet<(String, u64)>,
    pub turns_taken: u32,
    pub autonomous_cycles_done: u32,
}

impl Session {
    fn new(activation: &Activation) -> Self {
        Self {
            activation_id: activation.activation_id.clone(),
            agent_id: activation.agent_id.clone(),
            parent_agent_id: activation.parent_agent_id.clone(),
            parent_activation_id: activation.parent_activation_id.clone(),
            spawn_depth: activation.spawn_depth,
            status: SessionStatus::Queued,
            messages: Vec::new(),
            streaming_text: String::new(),
            token_count: 0,
            started_at: chrono::Utc::now(),
            completed_at: None,
            model_side_state: serde_json::Value::Null,
            spawned_children: HashSet::new(),
            turns_taken: 0,
            autonomous_cycles_done: activation.autonomous_cycles_done,
        }
    }

    /// Builds a fresh `Session` from the fields `ReplayController` recovers
    /// out of an `Activation` event's `data`, rather than a live `Activation`.
    pub fn reconstruct(
        activation_id: String,
        agent_id: String,
        parent_agent_id: Option<String>,
        parent_activation_id: Option<String>,
        spawn_depth: u32,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            activation_id,
            agent_id,
            parent_agent_id,
            parent_activation_id,
            spawn_depth,
            status: SessionStatus::Queued,
            messages: Vec::new(),
            streaming_text: String::new(),
            token_count: 0,
            started_at,
            completed_at: None,
            model_side_state: serde_json::Value::Null,
            spawned_children: HashSet::new(),
            turns_taken: 0,
            autonomous_cycles_done: 0,
        }
    }
}

pub fn hash_spawn_input(task: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    task.hash(&mut hasher);
    hasher.finish()
}

/// One change to a Session, broadcast to subscribers (the gateway's event
/// stream rides on this, separately from the replayable EventLog).
#[derive(Clone, Debug)]
pub enum SessionChange {
    Created { activation_id: String },
    StatusChanged { activation_id: String, status: SessionStatus },
    MessageAppended { activation_id: String },
    StreamingTextAppended { activation_id: String },
    TokenCountUpdated { activation_id: String, token_count: u64 },
}

pub struct SessionStore {
    sessions: RwLock<std::collections::HashMap<String, Session>>,
    tx: broadcast::Sender<SessionChange>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            sessions: RwLock::new(std::collections::HashMap::new()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.tx.subscribe()
    }

    fn publish(&self, change: SessionChange) {
        let _ = self.tx.send(change);
    }

    pub async fn create(&self, activation: &Activation) {
        let session = Session::new(activation);
        let id = session.activation_id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        self.publish(SessionChange::Created { activation_id: id });
    }

    /// Inserts an already-built `Session` verbatim, bypassing `Activation`
    /// derivation. Used by `ReplayController`, which reconstructs sessions
    /// from `EventEntry` data rather than from a live `Activation`, and by
    /// checkpoint restoration, which deserializes sessions wholesale.
    pub async fn insert_raw(&self, session: Session) {
        let id = session.activation_id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        self.publish(SessionChange::Created { activation_id: id });
    }

    pub async fn get(&self, activation_id: &str) -> Option<Session> {
        self.sessions.read().await.get(activation_id).cloned()
    }

    pub async fn set_status(&self, activation_id: &str, status: SessionStatus) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(activation_id) {
            session.status = status;
            if status.is_terminal() {
                session.completed_at = Some(chrono::Utc::now());
            }
        }
        drop(sessions);
        self.publish(SessionChange::StatusChanged {
            activation_id: activation_id.to_string(),
            status,
        });
    }

    pub async fn push_message(&self, activation_id: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(activation_id) {
            session.messages.push(message);
        }
        drop(sessions);
        self.publish(SessionChange::MessageAppended {
            activation_id: activation_id.to_string(),
        });
    }

    pub async fn append_streaming_text(&self, activation_id: &str, delta: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(activation_id) {
            session.streaming_text.push_str(delta);
        }
        drop(sessions);
        self.publish(SessionChange::StreamingTextAppended {
            activation_id: activation_id.to_string(),
        });
    }

    pub async fn take_streaming_text(&self, activation_id: &str) -> String {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(activation_id) {
            Some(session) => std::mem::take(&mut session.streaming_text),
            None => String::new(),
        }
    }

    pub async fn add_tokens(&self, activation_id: &str, tokens: u64) -> u64 {
        let mut sessions = self.sessions.write().await;
        let total = if let Some(session) = sessions.get_mut(activation_id) {
            session.token_count += tokens;
            session.token_count
        } else {
            0
        };
        drop(sessions);
        self.publish(SessionChange::TokenCountUpdated {
            activation_id: activation_id.to_string(),
            token_count: total,
        });
        total
    }

    pub async fn increment_turns(&self, activation_id: &str) -> u32 {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(activation_id) {
            Some(session) => {
                session.turns_taken += 1;
                session.turns_taken
            }
            None => 0,
        }
    }

    /// Records the provider's latest opaque continuation blob verbatim, to
    /// be replayed on the session's next outgoing request.
    pub async fn set_model_side_state(&self, activation_id: &str, state: serde_json::Value) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(activation_id) {
            session.model_side_state = state;
        }
    }

    pub async fn increment_autonomous_cycles(&self, activation_id: &str) -> u32 {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(activation_id) {
            Some(session) => {
                session.autonomous_cycles_done += 1;
                session.autonomous_cycles_done
            }
            None => 0,
        }
    }

    /// Records a spawn attempt; returns `true` if this `(agentId, inputHash)`
    /// pair is new for this parent (i.e. the spawn should proceed).
    pub async fn record_spawn_attempt(
        &self,
        parent_activation_id: &str,
        child_agent_id: &str,
        task: &str,
        novelty_override: bool,
    ) -> bool {
        if novelty_override {
            return true;
        }
        let key = (child_agent_id.to_string(), hash_spawn_input(task));
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(parent_activation_id) {
            Some(session) => session.spawned_children.insert(key),
            None => true,
        }
    }

    pub async fn all_running(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Running)
            .map(|s| s.activation_id.clone())
            .collect()
    }

    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `signal_parent` re-enqueues at one priority tier above normal.
pub fn signal_priority() -> Priority {
    Priority::Human
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentkernel_core::types::Activation;

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = SessionStore::new();
        let activation = Activation::root("agents/w.md", "hello");
        store.create(&activation).await;
        let session = store.get(&activation.activation_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Queued);
        assert_eq!(session.agent_id, "agents/w.md");
    }

    #[tokio::test]
    async fn spawn_dedup_rejects_repeat_without_override() {
        let store = SessionStore::new();
        let activation = Activation::root("agents/parent.md", "go");
        store.create(&activation).await;

        let first = store
            .record_spawn_attempt(&activation.activation_id, "agents/child.md", "task-a", false)
            .await;
        assert!(first);
        let second = store
            .record_spawn_attempt(&activation.activation_id, "agents/child.md", "task-a", false)
            .await;
        assert!(!second);
        let overridden = store
            .record_spawn_attempt(&activation.activation_id, "agents/child.md", "task-a", true)
            .await;
        assert!(overridden);
    }

    #[tokio::test]
    async fn status_transitions_are_visible() {
        let store = SessionStore::new();
        let activation = Activation::root("agents/w.md", "hello");
        store.create(&activation).await;
        store
            .set_status(&activation.activation_id, SessionStatus::Running)
            .await;
        let session = store.get(&activation.activation_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.completed_at.is_none());

        store
            .set_status(&activation.activation_id, SessionStatus::Completed)
            .await;
        let session = store.get(&activation.activation_id).await.unwrap();
        assert!(session.status.is_terminal());
        assert!(session.completed_at.is_some());
    }
}

//! Scheduler — the Kernel. Owns the ready queue, the concurrency
//! cap, per-run budget counters, pause/kill flags, and the autonomous-cycle
//! bookkeeping threaded through `activation_loop::drive`.

use crate::activation_loop;
use crate::session::{hash_spawn_input, SessionStore};
use agentkernel_core::handle::SpawnError;
use agentkernel_core::types::{Activation, EventType, KernelConfig, KernelStatus, Priority};
use agentkernel_core::{Error, KernelHandle, Result};
use agentkernel_llm::ProviderAdapter;
use agentkernel_registry::AgentRegistry;
use agentkernel_tools::ToolDispatcher;
use agentkernel_vfs::Vfs;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct Scheduler {
    pub config: KernelConfig,
    pub event_log: Arc<agentkernel_core::event_log::EventLog>,
    pub session_store: Arc<SessionStore>,
    pub registry: Arc<AgentRegistry>,
    pub vfs: Arc<dyn Vfs>,
    pub provider: Arc<ProviderAdapter>,
    pub dispatcher: Arc<ToolDispatcher>,

    queue: Mutex<Vec<Activation>>,
    queue_notify: Notify,
    semaphore: Arc<Semaphore>,
    running: DashMap<String, CancellationToken>,
    child_counts: DashMap<String, usize>,
    tokens_consumed: AtomicU64,
    paused: AtomicBool,
    resume_notify: Notify,
    killed: AtomicBool,
    latest_checkpoint: RwLock<Option<agentkernel_core::types::Checkpoint>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: KernelConfig,
        event_log: Arc<agentkernel_core::event_log::EventLog>,
        session_store: Arc<SessionStore>,
        registry: Arc<AgentRegistry>,
        vfs: Arc<dyn Vfs>,
        provider: Arc<ProviderAdapter>,
        dispatcher: Arc<ToolDispatcher>,
    ) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Arc::new(Self {
            config,
            event_log,
            session_store,
            registry,
            vfs,
            provider,
            dispatcher,
            queue: Mutex::new(Vec::new()),
            queue_notify: Notify::new(),
            semaphore,
            running: DashMap::new(),
            child_counts: DashMap::new(),
            tokens_consumed: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            killed: AtomicBool::new(false),
            latest_checkpoint: RwLock::new(None),
        })
    }

    pub fn enqueue(&self, activation: Activation) -> Result<()> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(());
        }
        // tokio::sync::Mutex requires an async lock, but enqueue is called
        // from both sync (KernelHandle-adjacent) and async call sites; use
        // try_lock since the queue is only ever briefly held.
        let mut queue = self.queue.try_lock().map_err(|_| Error::Internal("queue lock contended".into()))?;
        queue.push(activation);
        drop(queue);
        self.queue_notify.notify_waiters();
        Ok(())
    }

    fn pop_next(&self, queue: &mut Vec<Activation>) -> Option<Activation> {
        loop {
            if queue.is_empty() {
                return None;
            }
            // Tie-break: higher priority first, then earlier createdAt, then
            // lower spawnDepth (parents before grandchildren at the same wake).
            let (idx, _) = queue
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.priority
                        .cmp(&b.priority)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                        .then_with(|| b.spawn_depth.cmp(&a.spawn_depth))
                })
                .expect("queue checked non-empty");
            let activation = queue.remove(idx);
            if activation.spawn_depth > self.config.max_depth {
                self.event_log
                    .append(
                        &activation.activation_id,
                        &activation.agent_id,
                        EventType::Warning,
                        serde_json::json!({"message": "dropped at dequeue: spawn depth exceeds maxDepth"}),
                    )
                    .ok();
                continue;
            }
            return Some(activation);
        }
    }

    pub async fn run_until_empty(self: &Arc<Self>) -> Result<()> {
        loop {
            if self.killed.load(Ordering::SeqCst) {
                return Ok(());
            }
            if self.tokens_consumed.load(Ordering::SeqCst) >= self.config.token_budget {
                self.event_log
                    .append(
                        "",
                        "",
                        EventType::Warning,
                        serde_json::json!({"message": "global token budget exhausted"}),
                    )
                    .ok();
                self.drain_queue().await;
                return Ok(());
            }

            let next = {
                let mut queue = self.queue.lock().await;
                self.pop_next(&mut queue)
            };

            match next {
                Some(activation) => {
                    let permit = Arc::clone(&self.semaphore)
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::Internal("semaphore closed".into()))?;
                    let cancel = CancellationToken::new();
                    self.running.insert(activation.activation_id.clone(), cancel.clone());
                    let scheduler = Arc::clone(self);
                    tokio::spawn(async move {
                        activation_loop::drive(Arc::clone(&scheduler), activation, cancel).await;
                        drop(permit);
                    });
                }
                None => {
                    if self.running.is_empty() {
                        return Ok(());
                    }
                    self.queue_notify.notified().await;
                }
            }
        }
    }

    async fn drain_queue(&self) {
        let mut queue = self.queue.lock().await;
        queue.clear();
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume_notify.notify_waiters();
    }

    pub async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::SeqCst) && !self.killed.load(Ordering::SeqCst) {
            self.resume_notify.notified().await;
        }
    }

    pub async fn kill_all(&self) {
        self.killed.store(true, Ordering::SeqCst);
        for entry in self.running.iter() {
            entry.value().cancel();
        }
        self.drain_queue().await;
        self.resume_notify.notify_waiters();
        self.queue_notify.notify_waiters();
    }

    pub async fn on_activation_finished(&self, activation_id: &str) {
        self.running.remove(activation_id);
        self.queue_notify.notify_waiters();
        if self.event_log.should_checkpoint(true) {
            let checkpoint = self.checkpoint().await;
            *self.latest_checkpoint.write().await = Some(checkpoint);
        }
    }

    /// The most recent checkpoint taken at an activation-completion
    /// boundary, if any — `ReplayController`'s starting point when it wants
    /// to avoid replaying from genesis.
    pub async fn latest_checkpoint(&self) -> Option<agentkernel_core::types::Checkpoint> {
        self.latest_checkpoint.read().await.clone()
    }

    pub async fn status(&self) -> KernelStatus {
        let queue_count = self.queue.lock().await.len();
        let sessions = self.session_store.snapshot().await;
        let current_cycle = sessions.iter().map(|s| s.autonomous_cycles_done).max().unwrap_or(0);
        KernelStatus {
            is_running: !self.running.is_empty(),
            is_paused: self.paused.load(Ordering::SeqCst),
            total_tokens: self.tokens_consumed.load(Ordering::SeqCst),
            active_count: self.running.len(),
            queue_count,
            is_autonomous: current_cycle > 0,
            current_cycle,
            max_cycles: self.config.autonomous_max_cycles,
        }
    }

    pub fn add_global_tokens(&self, tokens: u64) {
        self.tokens_consumed.fetch_add(tokens, Ordering::SeqCst);
    }

    /// Snapshots `SessionStore` + the current VFS paths + the token counter
    /// into the opaque blob a `Checkpoint` carries. `AgentRegistry` is not
    /// part of the blob — `ReplayController` re-derives it by re-parsing
    /// every `agents/*` path out of the VFS snapshot, the same way the
    /// registry is populated during a live run.
    pub async fn checkpoint_state(&self) -> serde_json::Value {
        let sessions = self.session_store.snapshot().await;
        let mut vfs = std::collections::HashMap::new();
        for path in self.vfs.get_all_paths().await {
            if let Some(content) = self.vfs.read(&path).await {
                vfs.insert(path, content);
            }
        }
        serde_json::json!({
            "sessions": sessions,
            "vfs": vfs,
            "tokens_consumed": self.tokens_consumed.load(Ordering::SeqCst),
        })
    }

    /// Builds a `Checkpoint` tagged with the EventLog's current last id.
    pub async fn checkpoint(&self) -> agentkernel_core::types::Checkpoint {
        let state = self.checkpoint_state().await;
        self.event_log.checkpoint(state)
    }
}

#[async_trait]
impl KernelHandle for Scheduler {
    async fn spawn_child(
        &self,
        parent: &Activation,
        filename: String,
        content: String,
        task: String,
        novelty_override: bool,
    ) -> std::result::Result<String, SpawnError> {
        if parent.spawn_depth + 1 > self.config.max_depth {
            return Err(SpawnError::DepthLimit {
                max_depth: self.config.max_depth,
            });
        }

        let child_path = format!("agents/{filename}");
        let current_fanout = self
            .child_counts
            .get(&parent.activation_id)
            .map(|c| *c)
            .unwrap_or(0);
        if current_fanout >= self.config.max_fanout {
            return Err(SpawnError::FanoutLimit {
                max_fanout: self.config.max_fanout,
            });
        }

        let is_new = self
            .session_store
            .record_spawn_attempt(&parent.activation_id, &child_path, &task, novelty_override)
            .await;
        if !is_new {
            return Err(SpawnError::Duplicate);
        }

        if let Err(e) = self.vfs.write(&child_path, content.clone()).await {
            warn!(path = %child_path, error = %e, "spawn_agent vfs write failed");
            return Err(SpawnError::Duplicate);
        }
        if let Err(e) = self.registry.register_from_file(&child_path, &content) {
            warn!(path = %child_path, error = %e, "spawn_agent registration failed");
            return Err(SpawnError::Duplicate);
        }

        *self.child_counts.entry(parent.activation_id.clone()).or_insert(0) += 1;

        let child = Activation::child(parent, child_path.clone(), task, Priority::Normal);
        let child_activation_id = child.activation_id.clone();

        self.event_log
            .append(
                &parent.activation_id,
                &parent.agent_id,
                EventType::Spawn,
                serde_json::json!({
                    "child_activation_id": child_activation_id,
                    "child_agent_id": child_path,
                    "input_hash": hash_spawn_input(&child.input),
                }),
            )
            .ok();

        self.enqueue(child)
            .map_err(|_| SpawnError::Duplicate)?;
        Ok(child_activation_id)
    }

    async fn signal_parent(
        &self,
        parent_agent_id: Option<&str>,
        parent_activation_id: Option<&str>,
        message: String,
    ) -> std::result::Result<(), String> {
        let Some(agent_id) = parent_agent_id else {
            return Err("no parent".to_string());
        };
        let spawn_depth = match parent_activation_id {
            Some(id) => self
                .session_store
                .get(id)
                .await
                .map(|s| s.spawn_depth)
                .unwrap_or(0),
            None => 0,
        };

        let reactivation = Activation {
            activation_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            input: message.clone(),
            parent_agent_id: None,
            parent_activation_id: None,
            spawn_depth,
            priority: crate::session::signal_priority(),
            created_at: chrono::Utc::now(),
            autonomous_cycles_done: 0,
        };

        self.event_log
            .append(
                parent_activation_id.unwrap_or(""),
                agent_id,
                EventType::Signal,
                serde_json::json!({"message": message}),
            )
            .ok();

        self.enqueue(reactivation).map_err(|e| e.to_string())?;
        Ok(())
    }
}

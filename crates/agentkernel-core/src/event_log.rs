//! EventLog — append-only ordered record of kernel events.
//!
//! Persisted as JSONL (one `EventEntry` per line, strictly monotonic `id`)
//! when opened with a journal path, so the one piece of kernel state spec.md
//! requires to survive a process restart — the event log — actually does.

use crate::error::{Error, Result};
use crate::types::{Checkpoint, EventEntry, EventType};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::broadcast;

const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Append-only log of `EventEntry`. Cheap to share: clone the `Arc` around it.
///
/// Backed by a plain `std::sync::RwLock<Vec<_>>` rather than a lock-free
/// structure — the single-threaded cooperative model means there is never
/// contention across OS threads, only interleaving of Tokio tasks, so a
/// coarse lock held for the duration of a `push`/`clone` is cheap.
pub struct EventLog {
    entries: RwLock<Vec<EventEntry>>,
    next_id: AtomicU64,
    checkpoint_interval: u64,
    last_checkpoint_id: AtomicU64,
    tx: broadcast::Sender<EventEntry>,
    journal: Option<Mutex<File>>,
}

impl EventLog {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            last_checkpoint_id: AtomicU64::new(0),
            tx,
            journal: None,
        }
    }

    pub fn with_checkpoint_interval(interval: u64) -> Self {
        let mut log = Self::new();
        log.checkpoint_interval = interval;
        log
    }

    /// Opens (or creates) a JSONL journal at `path`, replays whatever entries
    /// are already on disk into memory, and keeps the file open in append
    /// mode so every subsequent `append()` is written through to disk before
    /// it returns. This is the "disk sync" half of the event log contract —
    /// a fresh process pointed at the same path picks up where the last one
    /// left off.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let loaded = load_journal(&path)?;
        let next_id = loaded.last().map(|e| e.id + 1).unwrap_or(1);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;

        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        tracing::info!(path = %path.display(), entries = loaded.len(), "opened event log journal");
        Ok(Self {
            entries: RwLock::new(loaded),
            next_id: AtomicU64::new(next_id),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            last_checkpoint_id: AtomicU64::new(0),
            tx,
            journal: Some(Mutex::new(file)),
        })
    }

    /// Append an entry, assigning it the next monotonic id. Notifies
    /// subscribers synchronously (the broadcast send happens before this
    /// call returns, preserving append order for anyone polling afterwards).
    pub fn append(
        &self,
        activation_id: impl Into<String>,
        agent_id: impl Into<String>,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = EventEntry {
            id,
            timestamp: chrono::Utc::now(),
            activation_id: activation_id.into(),
            agent_id: agent_id.into(),
            event_type,
            data,
        };

        let mut guard = self
            .entries
            .write()
            .map_err(|_| Error::EventLogFull("event log lock poisoned".into()))?;
        guard.push(entry.clone());
        drop(guard);

        self.persist(&entry)?;

        // Subscribers are best-effort; a lagging subscriber must resync via snapshot().
        let _ = self.tx.send(entry);

        Ok(id)
    }

    /// Writes one line to the journal file, if configured, and flushes it —
    /// a durability guarantee at the granularity of one event, not a batch.
    fn persist(&self, entry: &EventEntry) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let mut file = journal
            .lock()
            .map_err(|_| Error::EventLogFull("event log journal lock poisoned".into()))?;
        let line = serde_json::to_string(entry).map_err(Error::Json)?;
        writeln!(file, "{line}").map_err(Error::Io)?;
        file.flush().map_err(Error::Io)?;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.read().expect("event log lock poisoned").clone()
    }

    /// Entries strictly after `event_id`, in append order.
    pub fn since(&self, event_id: u64) -> Vec<EventEntry> {
        self.entries
            .read()
            .expect("event log lock poisoned")
            .iter()
            .filter(|e| e.id > event_id)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEntry> {
        self.tx.subscribe()
    }

    pub fn last_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst).saturating_sub(1)
    }

    pub fn clear(&self) {
        self.entries.write().expect("event log lock poisoned").clear();
    }

    /// Whether an agent-completion boundary (or the periodic interval) warrants
    /// a fresh checkpoint right now.
    pub fn should_checkpoint(&self, at_completion_boundary: bool) -> bool {
        if at_completion_boundary {
            return true;
        }
        let last = self.last_checkpoint_id.load(Ordering::SeqCst);
        self.last_id().saturating_sub(last) >= self.checkpoint_interval
    }

    /// Build a checkpoint tagging the current last event id. `state` is an
    /// opaque serialized snapshot of SessionStore + Scheduler counters +
    /// registry hash set, supplied by the caller (the Scheduler).
    pub fn checkpoint(&self, state: serde_json::Value) -> Checkpoint {
        let last_event_id = self.last_id();
        self.last_checkpoint_id.store(last_event_id, Ordering::SeqCst);
        Checkpoint {
            last_event_id,
            taken_at: chrono::Utc::now(),
            state,
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a JSONL journal back into memory, in append order. A missing file
/// is an empty log, not an error — the first `open()` on a fresh workspace.
/// A line that fails to parse is a corrupt-journal fault, not silently
/// skipped, since a gap would break the `id` monotonicity replay depends on.
fn load_journal(path: &Path) -> Result<Vec<EventEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::Io(err)),
    };
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(Error::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: EventEntry = serde_json::from_str(&line).map_err(Error::Json)?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_ids() {
        let log = EventLog::new();
        let a = log.append("act1", "agent1", EventType::Activation, serde_json::json!({})).unwrap();
        let b = log.append("act1", "agent1", EventType::Complete, serde_json::json!({})).unwrap();
        assert!(b > a);
        assert_eq!(log.snapshot().len(), 2);
    }

    #[test]
    fn since_filters_strictly_after() {
        let log = EventLog::new();
        let a = log.append("act1", "agent1", EventType::Activation, serde_json::json!({})).unwrap();
        log.append("act1", "agent1", EventType::Complete, serde_json::json!({})).unwrap();
        assert_eq!(log.since(a).len(), 1);
    }

    #[test]
    fn checkpoint_tracks_last_id() {
        let log = EventLog::new();
        log.append("act1", "agent1", EventType::Activation, serde_json::json!({})).unwrap();
        let cp = log.checkpoint(serde_json::json!({"sessions": []}));
        assert_eq!(cp.last_event_id, 1);
        assert!(!log.should_checkpoint(false));
    }

    #[test]
    fn journal_round_trips_across_process_restarts() {
        let path = std::env::temp_dir().join(format!("agentkernel-eventlog-{}.jsonl", uuid::Uuid::new_v4()));
        let _guard = RemoveOnDrop(path.clone());

        let first = EventLog::open(&path).unwrap();
        first.append("act1", "agent1", EventType::Activation, serde_json::json!({"n": 1})).unwrap();
        first.append("act1", "agent1", EventType::Complete, serde_json::json!({"n": 2})).unwrap();
        assert_eq!(first.last_id(), 2);
        drop(first);

        // A fresh EventLog opened at the same path picks up the prior entries
        // and continues the id sequence rather than restarting at 1.
        let second = EventLog::open(&path).unwrap();
        assert_eq!(second.snapshot().len(), 2);
        let c = second.append("act2", "agent1", EventType::Activation, serde_json::json!({"n": 3})).unwrap();
        assert_eq!(c, 3);
        assert_eq!(second.snapshot().len(), 3);

        let lines = std::fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 3);
    }

    #[test]
    fn open_on_missing_file_starts_empty() {
        let path = std::env::temp_dir().join(format!("agentkernel-eventlog-{}.jsonl", uuid::Uuid::new_v4()));
        let _guard = RemoveOnDrop(path.clone());
        let log = EventLog::open(&path).unwrap();
        assert_eq!(log.snapshot().len(), 0);
        assert_eq!(log.last_id(), 0);
    }

    struct RemoveOnDrop(std::path::PathBuf);
    impl Drop for RemoveOnDrop {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }
}

//! In-process reference `Vfs` implementation. A real browser deployment
//! would back the same trait with IndexedDB or similar — out of this
//! kernel's scope.

use crate::{normalize_path, Vfs, VfsEvent};
use agentkernel_core::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

pub struct MemoryVfs {
    files: DashMap<String, String>,
    tx: broadcast::Sender<VfsEvent>,
}

impl MemoryVfs {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            files: DashMap::new(),
            tx,
        }
    }

    /// Seed the VFS with an initial set of files, bypassing normalization
    /// checks and event emission — for test fixtures.
    pub fn seeded(files: impl IntoIterator<Item = (String, String)>) -> Self {
        let vfs = Self::new();
        for (path, content) in files {
            vfs.files.insert(path, content);
        }
        vfs
    }
}

impl Default for MemoryVfs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vfs for MemoryVfs {
    async fn read(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|v| v.clone())
    }

    async fn write(&self, path: &str, content: String) -> Result<()> {
        let path = normalize_path(path)?;
        self.files.insert(path.clone(), content);
        let _ = self.tx.send(VfsEvent::Written { path });
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        let existed = self.files.remove(&path).is_some();
        if existed {
            let _ = self.tx.send(VfsEvent::Deleted { path });
        }
        Ok(existed)
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    async fn get_all_paths(&self) -> Vec<String> {
        self.files.iter().map(|e| e.key().clone()).collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<VfsEvent> {
        self.tx.subscribe()
    }
}

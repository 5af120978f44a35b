//! VFS collaborator contract: path→blob mapping with change
//! notifications and glob listing, plus the in-memory reference
//! implementation used by the CLI and by tests.

pub mod glob;
pub mod memory;
pub mod suggest;

pub use glob::{build_glob_set, matches_any, matches_prefix_or_glob};
pub use memory::MemoryVfs;
pub use suggest::nearest_paths;

use agentkernel_core::Result;
use async_trait::async_trait;

/// A VFS mutation, broadcast to subscribers after it lands.
#[derive(Clone, Debug)]
pub enum VfsEvent {
    Written { path: String },
    Deleted { path: String },
}

/// Path→content mapping scoped to one run. Paths are forward-slash,
/// POSIX-like, relative, and never contain `..`; case-sensitive.
#[async_trait]
pub trait Vfs: Send + Sync {
    async fn read(&self, path: &str) -> Option<String>;
    async fn write(&self, path: &str, content: String) -> Result<()>;
    /// Returns whether the path existed before deletion.
    async fn delete(&self, path: &str) -> Result<bool>;
    async fn exists(&self, path: &str) -> bool;
    async fn get_all_paths(&self) -> Vec<String>;
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<VfsEvent>;
}

/// Rejects `..` segments and absolute paths — the one invariant every
/// `Vfs` implementation must enforce before touching storage.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(agentkernel_core::Error::Vfs(format!(
            "invalid path: {path}"
        )));
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_parent_traversal() {
        assert!(normalize_path("artifacts/../../etc/passwd").is_err());
    }

    #[test]
    fn normalize_rejects_absolute() {
        assert!(normalize_path("/etc/passwd").is_err());
    }

    #[test]
    fn normalize_accepts_relative() {
        assert_eq!(normalize_path("agents/writer.md").unwrap(), "agents/writer.md");
    }
}

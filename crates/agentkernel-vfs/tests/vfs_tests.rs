//! Integration coverage for the VFS collaborator: nearest-path suggestion
//! on a read miss, exercised end-to-end against `MemoryVfs`.

use agentkernel_vfs::{nearest_paths, MemoryVfs, Vfs};

#[tokio::test]
async fn vfs_read_miss_surfaces_nearest_existing_path() {
    let vfs = MemoryVfs::new();
    vfs.write("agents/writer.md", "body".to_string()).await.unwrap();
    vfs.write("agents/reader.md", "body".to_string()).await.unwrap();

    assert!(vfs.read("agents/writter.md").await.is_none());

    let all_paths = vfs.get_all_paths().await;
    let suggestions = nearest_paths("agents/writter.md", &all_paths, 3, 3);
    assert!(suggestions.contains(&"agents/writer.md".to_string()));
}

#[tokio::test]
async fn delete_unregisters_from_get_all_paths() {
    let vfs = MemoryVfs::new();
    vfs.write("artifacts/x.md", "A".to_string()).await.unwrap();
    assert!(vfs.delete("artifacts/x.md").await.unwrap());
    assert!(vfs.get_all_paths().await.is_empty());
}

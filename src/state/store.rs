//! Durable key/value state store.
//!
//! Keys are job-scoped string constants (see [`crate::constants::keys`]),
//! values are serialized JSON documents. No transactions; last-write-wins.

use crate::error::{GapfillError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Process-wide durable key/value store scoped to the owning deployment.
///
/// Every read and write round-trips to the backing storage; implementations
/// must not cache, because a re-invocation may be a fresh process.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON document per key under a root directory.
///
/// Writes go through a temp file followed by a rename so a crash mid-write
/// never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root)
            .await
            .map_err(|e| GapfillError::StateStore(format!("create {}: {e}", store.root.display())))?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

/// Encode a state key into a filesystem-safe file stem. Reversible per
/// character so distinct keys never collide on disk.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' => {
                encoded.push(b as char);
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GapfillError::StateStore(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| GapfillError::StateStore(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| GapfillError::StateStore(format!("rename {}: {e}", path.display())))?;

        debug!(key = %key, path = %path.display(), "State persisted");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GapfillError::StateStore(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.get("job::checkpoint").await.unwrap(), None);

        store.set("job::checkpoint", "{\"a\":1}").await.unwrap();
        assert_eq!(
            store.get("job::checkpoint").await.unwrap(),
            Some("{\"a\":1}".to_string())
        );

        store.delete("job::checkpoint").await.unwrap();
        assert_eq!(store.get("job::checkpoint").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_idempotent() {
        let store = MemoryStateStore::new();
        store.delete("never_set").await.unwrap();
    }

    #[test]
    fn test_key_encoding_distinguishes_keys() {
        assert_eq!(encode_key("archive_audit::checkpoint"), "archive_audit%3A%3Acheckpoint");
        assert_ne!(encode_key("a::b"), encode_key("a__b"));
        assert_ne!(encode_key("a::b"), encode_key("a:%3Ab"));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();

        store.set("gap_fill::checkpoint", "{\"cursor_index\":3}").await.unwrap();
        assert_eq!(
            store.get("gap_fill::checkpoint").await.unwrap(),
            Some("{\"cursor_index\":3}".to_string())
        );

        // A fresh handle over the same directory sees the same data
        let reopened = FileStateStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("gap_fill::checkpoint").await.unwrap(),
            Some("{\"cursor_index\":3}".to_string())
        );

        reopened.delete("gap_fill::checkpoint").await.unwrap();
        assert_eq!(store.get("gap_fill::checkpoint").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_missing_key_and_idempotent_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get("absent").await.unwrap(), None);
        store.delete("absent").await.unwrap();
    }
}

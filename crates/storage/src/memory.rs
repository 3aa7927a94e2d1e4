//! In-process key-value store.
//!
//! Useful for sessions that do not need the cache to survive a restart, and
//! for tests (write failures can be injected).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tablemap_common::{TableError, TableResult};
use tokio::sync::RwLock;

use crate::kv::KeyValueStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> TableResult<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> TableResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TableError::Cache(format!("write rejected for {}", key)));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> TableResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn len(&self) -> TableResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn retain_prefix(&self, prefix: &str) -> TableResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", b"one").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"one")));

        store.set("a", b"two").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"two")));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.set("a", b"x").await.is_err());
        store.set_fail_writes(false);
        assert!(store.set("a", b"x").await.is_ok());
    }

    #[tokio::test]
    async fn test_retain_prefix() {
        let store = MemoryStore::new();
        store.set("a_version_x", b"1").await.unwrap();
        store.set("b_version_x", b"1").await.unwrap();
        assert_eq!(store.retain_prefix("b_").await.unwrap(), 1);
        assert_eq!(store.keys().await, vec!["b_version_x".to_string()]);
    }
}

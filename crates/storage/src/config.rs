//! Cache configuration.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tablemap_common::TableResult;
use tracing::info;

use crate::kv::KeyValueStore;
use crate::memory::MemoryStore;
use crate::response_cache::ResponseCache;
use crate::sqlite::SqliteStore;

/// Token prefixed to every cache key. Bump it when the cached format changes.
pub const DEFAULT_CACHE_TOKEN: &str = "a";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache-format token namespacing all keys.
    pub token: String,
    /// SQLite database file. `None` keeps the cache in memory.
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            token: DEFAULT_CACHE_TOKEN.to_string(),
            path: None,
        }
    }
}

impl CacheConfig {
    /// Load from `TABLEMAP_CACHE_TOKEN` and `TABLEMAP_CACHE_PATH`.
    pub fn from_env() -> Self {
        Self {
            token: env::var("TABLEMAP_CACHE_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_CACHE_TOKEN.to_string()),
            path: env::var("TABLEMAP_CACHE_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Open the configured store and wrap it in a [`ResponseCache`].
    ///
    /// Entries written under a different token are dropped on open.
    pub async fn open(&self) -> TableResult<ResponseCache> {
        let store: Arc<dyn KeyValueStore> = match &self.path {
            Some(path) => Arc::new(SqliteStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let cache = ResponseCache::new(store, self.token.clone());
        let purged = cache.purge_other_tokens().await?;
        info!(
            token = %self.token,
            persistent = self.path.is_some(),
            purged = purged,
            "Response cache ready"
        );
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_purges_old_token_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let old = CacheConfig {
            token: "a".to_string(),
            path: Some(path.clone()),
        };
        old.open().await.unwrap().store("u", "v1", "[1]").await;

        let bumped = CacheConfig {
            token: "b".to_string(),
            path: Some(path.clone()),
        };
        bumped.open().await.unwrap();

        let reopened = old.open().await.unwrap();
        assert!(reopened.lookup("u", "v1").await.is_none());
    }

    #[tokio::test]
    async fn test_persistent_entry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            token: "a".to_string(),
            path: Some(dir.path().join("cache.db")),
        };

        config.open().await.unwrap().store("u", "v1", "[1]").await;
        let cache = config.open().await.unwrap();
        assert_eq!(cache.lookup("u", "v1").await.as_deref(), Some("[1]"));
    }
}

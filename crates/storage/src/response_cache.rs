//! Version-aware cache of compressed table responses.
//!
//! Each endpoint URL owns two keys under the cache-format token:
//! `{token}_version_{url}` holds the table version the body was fetched at,
//! `{token}_response_{url}` holds the zlib-compressed body. A body is served
//! only when its stored version equals the live table version; any read or
//! decode problem evicts both keys and reports a miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;
use tablemap_common::{TableError, TableResult};
use tracing::{debug, warn};

use crate::compression::{compress, decompress};
use crate::kv::KeyValueStore;

/// Cache statistics.
///
/// All fields are atomic for lock-free reads.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Compressed response cache keyed by endpoint URL.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    token: String,
    stats: Arc<CacheStats>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, token: impl Into<String>) -> Self {
        Self {
            store,
            token: token.into(),
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn version_key(&self, url: &str) -> String {
        format!("{}_version_{}", self.token, url)
    }

    pub fn body_key(&self, url: &str) -> String {
        format!("{}_response_{}", self.token, url)
    }

    /// Return the cached body for `url` if it was stored at `current_version`.
    pub async fn lookup(&self, url: &str, current_version: &str) -> Option<String> {
        let cached_version = match self.store.get(&self.version_key(url)).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                self.record_miss();
                return None;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Cache version read failed");
                self.evict(url).await;
                self.record_miss();
                return None;
            }
        };

        if cached_version.as_ref() != current_version.as_bytes() {
            debug!(
                url = %url,
                cached = %String::from_utf8_lossy(&cached_version),
                current = %current_version,
                "Cached response is stale"
            );
            self.evict(url).await;
            self.record_miss();
            return None;
        }

        match self.read_body(url).await {
            Ok(text) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                counter!("tablemap_cache_hits_total").increment(1);
                debug!(url = %url, bytes = text.len(), "Cache hit");
                Some(text)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Discarding unreadable cache entry");
                self.evict(url).await;
                self.record_miss();
                None
            }
        }
    }

    async fn read_body(&self, url: &str) -> TableResult<String> {
        let compressed = self
            .store
            .get(&self.body_key(url))
            .await?
            .ok_or_else(|| TableError::Cache("version present without body".to_string()))?;
        decompress(&compressed)
    }

    /// Store `body` for `url` at `version`.
    ///
    /// Best-effort: a failed write is logged and both keys are evicted so a
    /// half-written entry is never served.
    pub async fn store(&self, url: &str, version: &str, body: &str) {
        match self.try_store(url, version, body).await {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Cache write failed");
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                self.evict(url).await;
            }
        }
    }

    async fn try_store(&self, url: &str, version: &str, body: &str) -> TableResult<()> {
        let compressed = compress(body)?;
        self.store
            .set(&self.version_key(url), version.as_bytes())
            .await?;
        self.store.set(&self.body_key(url), &compressed).await?;
        debug!(
            url = %url,
            raw_bytes = body.len(),
            compressed_bytes = compressed.len(),
            "Cached response"
        );
        Ok(())
    }

    /// Remove both keys for `url`. Failures are logged, never returned.
    pub async fn evict(&self, url: &str) {
        for key in [self.version_key(url), self.body_key(url)] {
            if let Err(e) = self.store.delete(&key).await {
                warn!(key = %key, error = %e, "Cache delete failed");
            }
        }
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        counter!("tablemap_cache_evictions_total").increment(1);
    }

    /// Drop entries written under any other cache-format token.
    pub async fn purge_other_tokens(&self) -> TableResult<u64> {
        let removed = self.store.retain_prefix(&format!("{}_", self.token)).await?;
        if removed > 0 {
            debug!(token = %self.token, removed = removed, "Purged entries from older cache tokens");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn record_miss(&self) {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        counter!("tablemap_cache_misses_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    const URL: &str = "https://example.test/api/v1/tables/t/rows?selectedVariables=a&maxResults=10000";

    fn cache() -> (Arc<MemoryStore>, ResponseCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone(), "a");
        (store, cache)
    }

    #[tokio::test]
    async fn test_hit_at_same_version() {
        let (_, cache) = cache();
        cache.store(URL, "v1", "[1]\n[2]").await;

        assert_eq!(cache.lookup(URL, "v1").await.as_deref(), Some("[1]\n[2]"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_version_mismatch_evicts_both_keys() {
        let (store, cache) = cache();
        cache.store(URL, "v1", "[1]").await;

        assert!(cache.lookup(URL, "v2").await.is_none());
        assert!(store.keys().await.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_corrupt_body_evicts_both_keys() {
        let (store, cache) = cache();
        store.set(&cache.version_key(URL), b"v1").await.unwrap();
        store.set(&cache.body_key(URL), b"garbage").await.unwrap();

        assert!(cache.lookup(URL, "v1").await.is_none());
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_version_without_body_is_miss() {
        let (store, cache) = cache();
        store.set(&cache.version_key(URL), b"v1").await.unwrap();

        assert!(cache.lookup(URL, "v1").await.is_none());
        assert!(store.get(&cache.version_key(URL)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_entry() {
        let (store, cache) = cache();
        store.set_fail_writes(true);
        cache.store(URL, "v1", "[1]").await;
        store.set_fail_writes(false);

        assert!(store.keys().await.is_empty());
        assert_eq!(cache.stats().write_failures, 1);
        assert!(cache.lookup(URL, "v1").await.is_none());
    }

    #[tokio::test]
    async fn test_token_namespaces_keys() {
        let store = Arc::new(MemoryStore::new());
        let old = ResponseCache::new(store.clone(), "a");
        old.store(URL, "v1", "[1]").await;

        let bumped = ResponseCache::new(store.clone(), "b");
        assert!(bumped.lookup(URL, "v1").await.is_none());
        assert_eq!(bumped.purge_other_tokens().await.unwrap(), 2);
        assert!(store.keys().await.is_empty());
    }
}

//! Async key-value store abstraction backing the response cache.

use async_trait::async_trait;
use bytes::Bytes;
use tablemap_common::TableResult;

/// A durable string-keyed byte store.
///
/// Writes to the same key are last-write-wins; no locking is provided across
/// keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`.
    async fn get(&self, key: &str) -> TableResult<Option<Bytes>>;

    /// Store `value` under `key`, replacing any existing value.
    async fn set(&self, key: &str, value: &[u8]) -> TableResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> TableResult<()>;

    /// Number of stored keys.
    async fn len(&self) -> TableResult<u64>;

    /// Remove every key that does not start with `prefix`.
    ///
    /// Used to drop entries written under an older cache-format token.
    async fn retain_prefix(&self, prefix: &str) -> TableResult<u64>;
}

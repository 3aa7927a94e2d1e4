//! Durable key-value store in SQLite with sqlx.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tablemap_common::{TableError, TableResult};
use tracing::{debug, info};

use crate::kv::KeyValueStore;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

/// Cache entries persisted in a single SQLite table.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the cache database at the given path.
    pub async fn open(path: &Path) -> TableResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| TableError::Cache(format!("Failed to open SQLite database: {}", e)))?;

        let store = Self { pool };
        store.migrate().await?;

        info!(path = %path.display(), "Opened cache database");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> TableResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // One connection: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(sql_error)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> TableResult<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(())
    }
}

fn sql_error(err: sqlx::Error) -> TableError {
    TableError::Cache(format!("SQLite error: {}", err))
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> TableResult<Option<Bytes>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM cache_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_error)?;

        Ok(row.map(|(value,)| Bytes::from(value)))
    }

    async fn set(&self, key: &str, value: &[u8]) -> TableResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        debug!(key = %key, bytes = value.len(), "Stored cache entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> TableResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(())
    }

    async fn len(&self) -> TableResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(count as u64)
    }

    async fn retain_prefix(&self, prefix: &str) -> TableResult<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE substr(key, 1, ?) != ?")
            .bind(prefix.chars().count() as i64)
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let store = SqliteStore::open_memory().await.unwrap();
        store.set("k", b"first").await.unwrap();
        store.set("k", b"second").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"second")));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = SqliteStore::open_memory().await.unwrap();
        store.delete("absent").await.unwrap();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retain_prefix_drops_other_tokens() {
        let store = SqliteStore::open_memory().await.unwrap();
        store.set("a_version_u", b"1").await.unwrap();
        store.set("a_response_u", b"1").await.unwrap();
        store.set("b_version_u", b"1").await.unwrap();

        assert_eq!(store.retain_prefix("b_").await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.get("b_version_u").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("tablemap.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.set("persisted", b"body").await.unwrap();
        }

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("persisted").await.unwrap(),
            Some(Bytes::from_static(b"body"))
        );
    }
}

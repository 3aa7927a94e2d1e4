//! Local response cache for the tablemap data layer.
//!
//! Provides:
//! - A [`KeyValueStore`] abstraction with SQLite and in-memory backends
//! - zlib compression of cached bodies
//! - [`ResponseCache`], which serves a body only at the table version it was fetched at

pub mod compression;
pub mod config;
pub mod kv;
pub mod memory;
pub mod response_cache;
pub mod sqlite;

pub use config::{CacheConfig, DEFAULT_CACHE_TOKEN};
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use response_cache::{CacheStatsSnapshot, ResponseCache};
pub use sqlite::SqliteStore;

//! Client for the remote table store.
//!
//! - [`retry`]: GET with bounded retry on transport failure
//! - [`TableApi`]: table version and rows endpoints
//! - [`RowFetcher`]: paginated, cache-backed row fetching

pub mod api;
pub mod config;
pub mod ndjson;
pub mod retry;
pub mod rows;

pub use api::{with_start_index, TableApi};
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
pub use ndjson::parse_rows;
pub use retry::{retry, RetryPolicy, RetryingClient};
pub use rows::RowFetcher;

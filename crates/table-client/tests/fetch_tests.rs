//! Row fetching against the synthetic table server.

use std::sync::Arc;

use storage::{compression, KeyValueStore, MemoryStore, ResponseCache};
use table_client::{ClientConfig, RetryPolicy, RowFetcher, TableApi};
use tablemap_common::{CollectingNotifier, ColumnSet, NoticeKind, Variable};
use test_utils::{sequential_rows, unreachable_base_url, MockTable, MockTableServer};

const TABLE: &str = "demo.sequence";

struct Harness {
    server: MockTableServer,
    fetcher: RowFetcher,
    store: Arc<MemoryStore>,
    notifier: Arc<CollectingNotifier>,
}

impl Harness {
    async fn new(page_size: usize, rows: usize) -> Self {
        let server = MockTableServer::start().await;
        server.add_table(
            TABLE,
            MockTable::new("v1", &["id", "name"]).with_rows(sequential_rows(rows)),
        );
        let config = ClientConfig::default()
            .with_base_url(server.base_url())
            .with_token("test-token")
            .with_page_size(page_size)
            .with_retry(RetryPolicy::immediate(2));
        Self::with_config(server, config)
    }

    fn with_config(server: MockTableServer, config: ClientConfig) -> Self {
        let api = Arc::new(TableApi::new(&config).unwrap());
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone(), "a");
        let notifier = Arc::new(CollectingNotifier::new());
        let fetcher = RowFetcher::new(api, cache, notifier.clone());
        Self {
            server,
            fetcher,
            store,
            notifier,
        }
    }

    async fn fetch(&self) -> Vec<Vec<serde_json::Value>> {
        self.fetcher.fetch_rows(TABLE, &columns()).await
    }

    fn first_page_url(&self) -> String {
        self.fetcher
            .api()
            .rows_url(TABLE, &columns())
            .unwrap()
            .to_string()
    }
}

fn columns() -> ColumnSet {
    ColumnSet::from_variables(&[Variable::new("id"), Variable::new("name")])
}

fn ids(rows: &[Vec<serde_json::Value>]) -> Vec<u64> {
    rows.iter().map(|r| r[0].as_u64().unwrap()).collect()
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pages_concatenate_in_order() {
    let h = Harness::new(10_000, 20_003).await;

    let rows = h.fetch().await;

    assert_eq!(rows.len(), 20_003);
    assert_eq!(ids(&rows), (0..20_003).collect::<Vec<u64>>());
    assert_eq!(h.server.row_requests(), 3);

    let offsets: Vec<Option<String>> = h
        .server
        .row_queries()
        .iter()
        .map(|q| q.get("startIndex").cloned())
        .collect();
    assert_eq!(
        offsets,
        vec![None, Some("10000".to_string()), Some("20000".to_string())]
    );
    assert!(h.notifier.is_empty());
}

#[tokio::test]
async fn test_exact_multiple_ends_with_empty_page() {
    let h = Harness::new(2, 4).await;

    let rows = h.fetch().await;

    assert_eq!(ids(&rows), vec![0, 1, 2, 3]);
    assert_eq!(h.server.row_requests(), 3);
}

#[tokio::test]
async fn test_requests_carry_selection_and_token() {
    let h = Harness::new(10_000, 1).await;
    h.fetch().await;

    let query = &h.server.row_queries()[0];
    assert_eq!(query.get("selectedVariables").map(String::as_str), Some("id,name"));
    assert_eq!(query.get("maxResults").map(String::as_str), Some("10000"));
    assert!(h
        .server
        .authorizations()
        .iter()
        .all(|a| a == "Bearer test-token"));
}

// ============================================================================
// Cache behavior
// ============================================================================

#[tokio::test]
async fn test_second_fetch_served_from_cache() {
    let h = Harness::new(10_000, 3).await;

    let first = h.fetch().await;
    let second = h.fetch().await;

    assert_eq!(first, second);
    assert_eq!(h.server.version_requests(), 2);
    assert_eq!(h.server.row_requests(), 1);
    assert_eq!(h.fetcher.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_version_change_refetches_and_overwrites() {
    let h = Harness::new(10_000, 3).await;
    h.fetch().await;

    h.server.set_version(TABLE, "v2");
    h.server.set_rows(TABLE, sequential_rows(5));
    let rows = h.fetch().await;

    assert_eq!(rows.len(), 5);
    assert_eq!(h.server.row_requests(), 2);

    let cache = h.fetcher.cache();
    let url = h.first_page_url();
    let version = h.store.get(&cache.version_key(&url)).await.unwrap().unwrap();
    assert_eq!(&version[..], b"v2");
}

#[tokio::test]
async fn test_corrupt_cached_body_refetches() {
    let h = Harness::new(10_000, 3).await;
    h.fetch().await;

    let body_key = h.fetcher.cache().body_key(&h.first_page_url());
    h.store.set(&body_key, b"not zlib at all").await.unwrap();

    let rows = h.fetch().await;

    assert_eq!(ids(&rows), vec![0, 1, 2]);
    assert_eq!(h.server.row_requests(), 2);
    assert!(h.notifier.is_empty());

    let restored = h.store.get(&body_key).await.unwrap().unwrap();
    assert!(compression::decompress(&restored).is_ok());
}

#[tokio::test]
async fn test_unparseable_cached_rows_refetch() {
    let h = Harness::new(10_000, 2).await;
    h.fetch().await;

    let body_key = h.fetcher.cache().body_key(&h.first_page_url());
    let garbage = compression::compress("{not rows}").unwrap();
    h.store.set(&body_key, &garbage).await.unwrap();

    assert_eq!(ids(&h.fetch().await), vec![0, 1]);
    assert_eq!(h.server.row_requests(), 2);
}

// ============================================================================
// Failures degrade to empty results
// ============================================================================

#[tokio::test]
async fn test_remote_error_notifies_and_yields_empty() {
    let h = Harness::new(10_000, 3).await;
    h.server.fail_next_rows(500, "quota exceeded");

    let rows = h.fetch().await;

    assert!(rows.is_empty());
    assert_eq!(h.server.row_requests(), 1);

    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Fetch);
    assert_eq!(notices[0].table, TABLE);
    assert!(notices[0].text().contains("quota exceeded"));
    assert!(h.store.keys().await.is_empty());
}

#[tokio::test]
async fn test_failed_later_page_discards_whole_fetch() {
    let h = Harness::new(2, 5).await;
    h.server.fail_rows_at(2, 502, "page lost");

    let rows = h.fetch().await;

    assert!(rows.is_empty());
    assert_eq!(h.notifier.len(), 1);
    // Only the first page stays cached.
    assert_eq!(h.store.keys().await.len(), 2);

    // The retry after the failure completes normally.
    assert_eq!(ids(&h.fetch().await), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_failed_version_check_evicts_cached_page() {
    let h = Harness::new(10_000, 3).await;
    h.fetch().await;
    assert_eq!(h.store.keys().await.len(), 2);

    h.server.fail_next_version(503, "maintenance");
    let rows = h.fetch().await;

    assert!(rows.is_empty());
    assert!(h.notifier.notices()[0].text().contains("maintenance"));
    assert!(h.store.keys().await.is_empty());

    // The next fetch goes back to the network for the rows.
    assert_eq!(ids(&h.fetch().await), vec![0, 1, 2]);
    assert_eq!(h.server.row_requests(), 2);
}

#[tokio::test]
async fn test_malformed_body_is_not_cached() {
    let server = MockTableServer::start().await;
    server.add_table(
        TABLE,
        MockTable::new("v1", &["id", "name"]).with_raw_body("[1,\"a\"]\nnot json"),
    );
    let config = ClientConfig::default()
        .with_base_url(server.base_url())
        .with_retry(RetryPolicy::immediate(0));
    let h = Harness::with_config(server, config);

    assert!(h.fetch().await.is_empty());
    assert!(h.notifier.notices()[0].message.contains("row 2"));
    assert!(h.store.keys().await.is_empty());
}

#[tokio::test]
async fn test_unknown_table_notifies() {
    let h = Harness::new(10_000, 1).await;

    let rows = h.fetcher.fetch_rows("demo.missing", &columns()).await;

    assert!(rows.is_empty());
    assert!(h.notifier.notices()[0].text().contains("not found"));
    assert_eq!(h.server.row_requests(), 0);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let server = MockTableServer::start().await;
    let config = ClientConfig::default()
        .with_base_url(unreachable_base_url().await)
        .with_retry(RetryPolicy::immediate(1));
    let h = Harness::with_config(server, config);

    let err = h
        .fetcher
        .try_fetch_rows(TABLE, &columns())
        .await
        .unwrap_err();
    assert!(err.is_transient());

    assert!(h.fetch().await.is_empty());
    assert_eq!(h.notifier.len(), 1);
}

#[tokio::test]
async fn test_evict_rows_clears_every_page() {
    let h = Harness::new(2, 5).await;
    let rows = h.fetch().await;
    assert_eq!(h.store.keys().await.len(), 6);

    h.fetcher
        .evict_rows(TABLE, &columns(), rows.len())
        .await
        .unwrap();

    assert!(h.store.keys().await.is_empty());
}

//! Paginated row fetching through the response cache.
//!
//! A fetch resolves the live table version once, then walks pages of
//! `page_size` rows. Each page URL is looked up in the cache at that version
//! before going to the network. A page shorter than `page_size` ends the
//! walk.

use std::sync::Arc;

use metrics::counter;
use reqwest::Url;
use storage::ResponseCache;
use tablemap_common::{ColumnSet, Notice, NoticeKind, Notifier, Row, TableResult};
use tracing::{debug, error, info, instrument, warn};

use crate::api::{with_start_index, TableApi};
use crate::ndjson::parse_rows;

/// Fetches every row of a column selection, page by page.
#[derive(Clone)]
pub struct RowFetcher {
    api: Arc<TableApi>,
    cache: ResponseCache,
    notifier: Arc<dyn Notifier>,
}

impl RowFetcher {
    pub fn new(api: Arc<TableApi>, cache: ResponseCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            cache,
            notifier,
        }
    }

    pub fn api(&self) -> &TableApi {
        &self.api
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Fetch all rows of `columns` from `table`.
    ///
    /// Never fails: any error is reported to the notifier and yields an empty
    /// result.
    #[instrument(skip(self, columns), fields(table = %table, columns = columns.len()))]
    pub async fn fetch_rows(&self, table: &str, columns: &ColumnSet) -> Vec<Row> {
        match self.try_fetch_rows(table, columns).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(table = %table, error = %e, category = e.category(), "Row fetch failed");
                self.notifier.notify(Notice::new(NoticeKind::Fetch, table, &e));
                Vec::new()
            }
        }
    }

    /// Fetch all rows, returning the first error instead of absorbing it.
    ///
    /// The page that failed has its cache entry evicted. Rows of earlier
    /// pages are discarded. A failed version check evicts the first page.
    pub async fn try_fetch_rows(&self, table: &str, columns: &ColumnSet) -> TableResult<Vec<Row>> {
        let first_page = self.api.rows_url(table, columns)?;
        let version = match self.api.table_version(table).await {
            Ok(version) => version,
            Err(e) => {
                self.cache.evict(first_page.as_str()).await;
                return Err(e);
            }
        };
        let page_size = self.api.page_size();

        let mut rows = Vec::new();
        let mut page = 0;
        let mut url = first_page.clone();

        loop {
            let page_rows = match self.fetch_page(&url, &version).await {
                Ok(page_rows) => page_rows,
                Err(e) => {
                    self.cache.evict(url.as_str()).await;
                    return Err(e);
                }
            };

            let count = page_rows.len();
            debug!(page = page, rows = count, "Fetched page");
            rows.extend(page_rows);

            if count < page_size {
                break;
            }
            page += 1;
            url = with_start_index(&first_page, page * page_size);
        }

        counter!("tablemap_rows_fetched_total").increment(rows.len() as u64);
        info!(
            table = %table,
            version = %version,
            rows = rows.len(),
            pages = page + 1,
            "Fetched rows"
        );
        Ok(rows)
    }

    /// Evict every cached page of a fetch that returned `row_count` rows.
    pub async fn evict_rows(
        &self,
        table: &str,
        columns: &ColumnSet,
        row_count: usize,
    ) -> TableResult<()> {
        let first_page = self.api.rows_url(table, columns)?;
        let page_size = self.api.page_size();
        let pages = row_count / page_size + 1;

        self.cache.evict(first_page.as_str()).await;
        for page in 1..pages {
            let url = with_start_index(&first_page, page * page_size);
            self.cache.evict(url.as_str()).await;
        }
        debug!(table = %table, pages = pages, "Evicted cached pages");
        Ok(())
    }

    async fn fetch_page(&self, url: &Url, version: &str) -> TableResult<Vec<Row>> {
        if let Some(body) = self.cache.lookup(url.as_str(), version).await {
            match parse_rows(&body) {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    warn!(url = %url, error = %e, "Cached rows unreadable, refetching");
                    self.cache.evict(url.as_str()).await;
                }
            }
        }

        let body = self.api.fetch_text(url).await?;
        let rows = parse_rows(&body)?;
        self.cache.store(url.as_str(), version, &body).await;
        Ok(rows)
    }
}

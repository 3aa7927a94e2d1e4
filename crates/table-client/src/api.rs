//! Remote table API endpoints.

use reqwest::Url;
use serde::Deserialize;
use tablemap_common::{ColumnSet, TableError, TableResult};
use tracing::debug;

use crate::config::ClientConfig;
use crate::retry::RetryingClient;

#[derive(Debug, Deserialize)]
struct TableInfo {
    hash: String,
}

/// Client for `GET /tables/{id}` and `GET /tables/{id}/rows`.
#[derive(Debug, Clone)]
pub struct TableApi {
    http: RetryingClient,
    base_url: Url,
    page_size: usize,
}

impl TableApi {
    pub fn new(config: &ClientConfig) -> TableResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            TableError::Config(format!("Invalid API base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TableError::Config(format!(
                "API base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        if config.page_size == 0 {
            return Err(TableError::Config("page size must be positive".to_string()));
        }

        Ok(Self {
            http: RetryingClient::new(config)?,
            base_url,
            page_size: config.page_size,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// `{base}/tables/{table}`
    pub fn table_url(&self, table: &str) -> TableResult<Url> {
        self.endpoint(&["tables", table])
    }

    /// `{base}/tables/{table}/rows?selectedVariables=..&maxResults=..`
    pub fn rows_url(&self, table: &str, columns: &ColumnSet) -> TableResult<Url> {
        let mut url = self.endpoint(&["tables", table, "rows"])?;
        url.query_pairs_mut()
            .append_pair("selectedVariables", &columns.to_query_value())
            .append_pair("maxResults", &self.page_size.to_string());
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> TableResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TableError::Config(format!("Invalid API base URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Current version hash of `table`. Always asks the remote store.
    pub async fn table_version(&self, table: &str) -> TableResult<String> {
        let url = self.table_url(table)?;
        let body = self.fetch_text(&url).await?;
        let info: TableInfo = serde_json::from_str(&body).map_err(|e| {
            TableError::Internal(format!("Unexpected table metadata for {}: {}", table, e))
        })?;
        debug!(table = %table, version = %info.hash, "Resolved table version");
        Ok(info.hash)
    }

    /// GET `url` and return its body, or a [`TableError::Remote`] carrying
    /// the body text when the status is not a success.
    pub async fn fetch_text(&self, url: &Url) -> TableResult<String> {
        let (status, body) = self.http.get_text(url).await?;
        if !status.is_success() {
            return Err(TableError::Remote {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }
}

/// `url` with its `startIndex` parameter set to `start`, keeping every other
/// query parameter in place.
pub fn with_start_index(url: &Url, start: usize) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "startIndex")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut next = url.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("startIndex", &start.to_string());
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemap_common::Variable;

    fn api(base: &str) -> TableApi {
        TableApi::new(&ClientConfig::default().with_base_url(base)).unwrap()
    }

    #[test]
    fn test_rows_url_lowercases_and_dedups_columns() {
        let columns = ColumnSet::from_variables(&[
            Variable::new("Name"),
            Variable::new("STATE"),
            Variable::new("name"),
        ]);
        let url = api("https://example.test/api/v1")
            .rows_url("demo.regions", &columns)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/api/v1/tables/demo.regions/rows?selectedVariables=name%2Cstate&maxResults=10000"
        );
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let url = api("https://example.test/api/v1/").table_url("t").unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/v1/tables/t");
    }

    #[test]
    fn test_start_index_replaces_existing_value() {
        let url = Url::parse("https://x.test/rows?selectedVariables=a&startIndex=5&maxResults=10").unwrap();
        let next = with_start_index(&url, 20);
        assert_eq!(
            next.as_str(),
            "https://x.test/rows?selectedVariables=a&maxResults=10&startIndex=20"
        );
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = ClientConfig::default().with_page_size(0);
        assert!(matches!(TableApi::new(&config), Err(TableError::Config(_))));
    }
}

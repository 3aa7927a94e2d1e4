//! Source loading with a per-session result cache.
//!
//! Source descriptors are immutable; decoded results live here, keyed by
//! source name. A failed fetch or decode is reported through the notifier,
//! yields an empty result and is not remembered, so the next call retries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use table_client::RowFetcher;
use tablemap_common::{
    Feature, FeatureAttributes, Notice, NoticeKind, RasterSource, RasterSourceGroup, TableError,
    TableResult, VectorSource,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::decode::FeatureDecoder;
use crate::filter::FilterIndex;
use crate::raster::decode_rasters;

/// A source's features and, when it has filter variables, a fresh index.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub name: String,
    pub features: Arc<Vec<Feature>>,
    pub filter_index: Option<FilterIndex>,
}

impl LoadedSource {
    /// Features passing the current filter selection.
    pub fn visible(&self) -> Vec<&Feature> {
        match &self.filter_index {
            Some(index) => index.apply(&self.features),
            None => self.features.iter().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct SourceResults {
    attributes: Option<Arc<Vec<FeatureAttributes>>>,
    features: Option<Arc<Vec<Feature>>>,
}

/// Fetches and decodes vector sources and raster groups.
pub struct SourcePipeline {
    fetcher: RowFetcher,
    results: RwLock<HashMap<String, SourceResults>>,
}

impl SourcePipeline {
    pub fn new(fetcher: RowFetcher) -> Self {
        Self {
            fetcher,
            results: RwLock::new(HashMap::new()),
        }
    }

    pub fn fetcher(&self) -> &RowFetcher {
        &self.fetcher
    }

    /// Decoded metadata rows of `source`, fetched once per session.
    pub async fn fetch_metadata(&self, source: &VectorSource) -> Arc<Vec<FeatureAttributes>> {
        match self.load_attributes(source).await {
            Ok(attributes) => attributes,
            Err(e) => {
                self.report(NoticeKind::Fetch, &source.table_identifier, &e);
                Arc::new(Vec::new())
            }
        }
    }

    /// Features of `source`, fetched and decoded once per session.
    ///
    /// Metadata is fetched first and zipped with the geometry rows by index.
    /// When the metadata fetch fails it is reported and the features are
    /// decoded without attributes; such a result is not remembered.
    #[instrument(skip(self, source), fields(source = %source.name))]
    pub async fn fetch_data(&self, source: &VectorSource) -> Arc<Vec<Feature>> {
        if let Some(features) = self.cached_features(&source.name).await {
            debug!("Serving decoded features from session cache");
            return features;
        }

        if let Err(e) = source.validate() {
            self.report(NoticeKind::Parse, source.display_name(), &e);
            return Arc::new(Vec::new());
        }

        let (attributes, complete) = match self.load_attributes(source).await {
            Ok(attributes) => (attributes, true),
            Err(e) => {
                self.report(NoticeKind::Fetch, &source.table_identifier, &e);
                (Arc::new(Vec::new()), false)
            }
        };

        let geometry_columns = source.geometry_columns();
        let rows = match self
            .fetcher
            .try_fetch_rows(&source.table_identifier, &geometry_columns)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                self.report(NoticeKind::Fetch, &source.table_identifier, &e);
                return Arc::new(Vec::new());
            }
        };

        match FeatureDecoder::new(source).decode_with_attributes(&attributes, &rows) {
            Ok(features) => {
                info!(
                    features = features.len(),
                    with_metadata = attributes.len().min(features.len()),
                    "Decoded features"
                );
                let features = Arc::new(features);
                if complete {
                    self.results
                        .write()
                        .await
                        .entry(source.name.clone())
                        .or_default()
                        .features = Some(features.clone());
                }
                features
            }
            Err(e) => {
                self.evict_source(source, attributes.len(), rows.len()).await;
                self.report(NoticeKind::Parse, source.display_name(), &e);
                Arc::new(Vec::new())
            }
        }
    }

    /// Load every source concurrently and index those with filter variables.
    pub async fn load_sources(&self, sources: &[VectorSource]) -> BTreeMap<String, LoadedSource> {
        let loads = sources.iter().map(|source| async move {
            let features = self.fetch_data(source).await;
            let filter_index = (!source.filter_variables.is_empty())
                .then(|| FilterIndex::build(features.iter(), source.filter_names().as_slice()));
            LoadedSource {
                name: source.name.clone(),
                features,
                filter_index,
            }
        });

        join_all(loads)
            .await
            .into_iter()
            .map(|loaded| (loaded.name.clone(), loaded))
            .collect()
    }

    /// Fetch every group concurrently; rasters are concatenated in group order.
    pub async fn load_rasters(&self, groups: &[RasterSourceGroup]) -> Vec<RasterSource> {
        let loads = groups.iter().map(|group| async move {
            let rows = self
                .fetcher
                .fetch_rows(&group.table_identifier, &group.columns())
                .await;
            decode_rasters(group, &rows)
        });

        join_all(loads).await.into_iter().flatten().collect()
    }

    /// Forget the session results of `source_name`. The response cache is
    /// left alone.
    pub async fn invalidate(&self, source_name: &str) {
        self.results.write().await.remove(source_name);
    }

    async fn cached_features(&self, source_name: &str) -> Option<Arc<Vec<Feature>>> {
        self.results
            .read()
            .await
            .get(source_name)
            .and_then(|r| r.features.clone())
    }

    async fn load_attributes(&self, source: &VectorSource) -> TableResult<Arc<Vec<FeatureAttributes>>> {
        if let Some(attributes) = self
            .results
            .read()
            .await
            .get(&source.name)
            .and_then(|r| r.attributes.clone())
        {
            return Ok(attributes);
        }

        let columns = source.metadata_columns();
        let attributes = if columns.is_empty() {
            Vec::new()
        } else {
            let rows = self
                .fetcher
                .try_fetch_rows(&source.table_identifier, &columns)
                .await?;
            let decoder = FeatureDecoder::new(source);
            rows.iter().map(|row| decoder.decode_attributes(row)).collect()
        };

        let attributes = Arc::new(attributes);
        self.results
            .write()
            .await
            .entry(source.name.clone())
            .or_default()
            .attributes = Some(attributes.clone());
        Ok(attributes)
    }

    /// Drop everything cached for `source`, session results and responses.
    async fn evict_source(&self, source: &VectorSource, metadata_rows: usize, geometry_rows: usize) {
        self.invalidate(&source.name).await;

        let table = &source.table_identifier;
        let metadata_columns = source.metadata_columns();
        if !metadata_columns.is_empty() {
            if let Err(e) = self
                .fetcher
                .evict_rows(table, &metadata_columns, metadata_rows)
                .await
            {
                warn!(source = %source.name, error = %e, "Failed to evict metadata responses");
            }
        }
        if let Err(e) = self
            .fetcher
            .evict_rows(table, &source.geometry_columns(), geometry_rows)
            .await
        {
            warn!(source = %source.name, error = %e, "Failed to evict geometry responses");
        }
    }

    fn report(&self, kind: NoticeKind, subject: &str, err: &TableError) {
        error!(subject = %subject, error = %err, category = err.category(), "Source load failed");
        self.fetcher.notifier().notify(Notice::new(kind, subject, err));
    }
}

/// Sources marked as loaded when nothing is selected explicitly.
pub fn default_sources(sources: &[VectorSource]) -> Vec<VectorSource> {
    sources.iter().filter(|s| s.is_default).cloned().collect()
}

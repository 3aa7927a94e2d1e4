//! Subcommand bodies. Each returns the text to print so it can be tested
//! without a terminal.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tablemap_common::{feature_collection, FilterValue, RasterSource};
use tracing::warn;
use vector_pipeline::{LoadedSource, SourcePipeline};

use crate::catalog::Catalog;

/// A `PROP=VALUE` selection from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterArg {
    pub property: String,
    pub value: FilterValue,
}

impl FromStr for FilterArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((property, value)) if !property.trim().is_empty() => Ok(Self {
                property: property.trim().to_string(),
                value: FilterValue::parse(value),
            }),
            _ => Err(format!("expected PROP=VALUE, got '{}'", s)),
        }
    }
}

/// Restrict each filtered property to the listed values in every source
/// that tracks it. Returns the properties no source tracks.
pub fn apply_selections(
    loaded: &mut BTreeMap<String, LoadedSource>,
    filters: &[FilterArg],
) -> Vec<String> {
    let mut grouped: BTreeMap<&str, Vec<FilterValue>> = BTreeMap::new();
    for filter in filters {
        grouped
            .entry(filter.property.as_str())
            .or_default()
            .push(filter.value.clone());
    }

    let mut unmatched = Vec::new();
    for (property, values) in grouped {
        let mut matched = false;
        for source in loaded.values_mut() {
            if let Some(index) = source.filter_index.as_mut() {
                matched |= index.select_only(property, &values);
            }
        }
        if !matched {
            warn!(property = property, "No loaded source tracks this property");
            unmatched.push(property.to_string());
        }
    }
    unmatched
}

pub async fn fetch(
    pipeline: &SourcePipeline,
    catalog: &Catalog,
    names: &[String],
    filters: &[FilterArg],
) -> Result<String> {
    let sources = catalog.select(names)?;
    let mut loaded = pipeline.load_sources(&sources).await;
    apply_selections(&mut loaded, filters);

    let collection = feature_collection(loaded.values().flat_map(LoadedSource::visible));
    Ok(serde_json::to_string_pretty(&collection)?)
}

pub async fn filters(pipeline: &SourcePipeline, catalog: &Catalog, names: &[String]) -> Result<String> {
    let sources = catalog.select(names)?;
    let loaded = pipeline.load_sources(&sources).await;
    Ok(serde_json::to_string_pretty(&filter_summary(&loaded))?)
}

/// `{source: {property: [value, ...]}}` with values in display order.
pub fn filter_summary(loaded: &BTreeMap<String, LoadedSource>) -> Value {
    let mut summary = Map::new();
    for (name, source) in loaded {
        let Some(index) = &source.filter_index else {
            continue;
        };
        let properties: Map<String, Value> = index
            .iter()
            .map(|(property, filter)| {
                let values: Vec<Value> = filter
                    .values()
                    .into_iter()
                    .map(|v| Value::String(v.to_string()))
                    .collect();
                (property.to_string(), Value::Array(values))
            })
            .collect();
        summary.insert(name.clone(), Value::Object(properties));
    }
    Value::Object(summary)
}

pub async fn rasters(pipeline: &SourcePipeline, catalog: &Catalog) -> Result<String> {
    let rasters = pipeline.load_rasters(&catalog.rasters).await;
    raster_lines(&rasters)
}

/// One JSON object per line.
pub fn raster_lines(rasters: &[RasterSource]) -> Result<String> {
    let mut out = String::new();
    for raster in rasters {
        out.push_str(&serde_json::to_string(raster)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn sources(catalog: &Catalog) -> Result<String> {
    let vectors: Vec<Value> = catalog
        .vectors
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "label": s.display_name(),
                "table": s.table_identifier,
                "default": s.is_default,
                "filters": s.filter_names(),
            })
        })
        .collect();
    let rasters: Vec<Value> = catalog
        .rasters
        .iter()
        .map(|g| json!({ "name": g.name, "table": g.table_identifier }))
        .collect();
    Ok(serde_json::to_string_pretty(
        &json!({ "vectors": vectors, "rasters": rasters }),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use storage::{MemoryStore, ResponseCache};
    use table_client::{ClientConfig, RetryPolicy, RowFetcher, TableApi};
    use tablemap_common::CollectingNotifier;
    use test_utils::{
        regions_source, regions_table, stations_source, stations_table, tiles_group, tiles_table,
        MockTableServer, REGIONS_TABLE, STATIONS_TABLE, TILES_TABLE,
    };

    async fn setup() -> (MockTableServer, SourcePipeline, Catalog) {
        let server = MockTableServer::start().await;
        server.add_table(REGIONS_TABLE, regions_table());
        server.add_table(STATIONS_TABLE, stations_table());
        server.add_table(TILES_TABLE, tiles_table());

        let config = ClientConfig::default()
            .with_base_url(server.base_url())
            .with_retry(RetryPolicy::immediate(1));
        let api = Arc::new(TableApi::new(&config).unwrap());
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), "a");
        let fetcher = RowFetcher::new(api, cache, Arc::new(CollectingNotifier::new()));

        let catalog = Catalog {
            vectors: vec![regions_source(), stations_source()],
            rasters: vec![tiles_group()],
        };
        (server, SourcePipeline::new(fetcher), catalog)
    }

    #[test]
    fn test_parse_filter_arg() {
        let arg: FilterArg = "state=CA".parse().unwrap();
        assert_eq!(arg.property, "state");
        assert_eq!(arg.value, FilterValue::Text("CA".into()));

        let arg: FilterArg = "state=(null)".parse().unwrap();
        assert_eq!(arg.value, FilterValue::Null);

        assert!("state".parse::<FilterArg>().is_err());
        assert!("=CA".parse::<FilterArg>().is_err());
    }

    #[tokio::test]
    async fn test_fetch_defaults_with_filter() {
        let (_server, pipeline, catalog) = setup().await;
        let filters = vec!["state=NV".parse().unwrap(), "state=(null)".parse().unwrap()];

        let out = fetch(&pipeline, &catalog, &[], &filters).await.unwrap();
        let collection: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(collection["type"], "FeatureCollection");
        let names: Vec<&Value> = collection["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| &f["properties"]["regionName"])
            .collect();
        assert_eq!(names, vec![&json!("Washoe"), &json!("Unassigned")]);
    }

    #[tokio::test]
    async fn test_unmatched_filter_property_is_reported() {
        let (_server, pipeline, catalog) = setup().await;
        let mut loaded = pipeline.load_sources(&catalog.vectors).await;

        let unmatched = apply_selections(&mut loaded, &["colour=red".parse().unwrap()]);
        assert_eq!(unmatched, vec!["colour".to_string()]);
    }

    #[tokio::test]
    async fn test_filters_summary() {
        let (_server, pipeline, catalog) = setup().await;
        let names = vec!["regions".to_string(), "stations".to_string()];

        let out = filters(&pipeline, &catalog, &names).await.unwrap();
        let summary: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(summary["regions"]["state"], json!(["(null)", "CA", "NV"]));
        assert_eq!(summary["stations"]["network"], json!(["ASOS", "CWOP"]));
    }

    #[tokio::test]
    async fn test_rasters_as_json_lines() {
        let (_server, pipeline, catalog) = setup().await;

        let out = rasters(&pipeline, &catalog).await.unwrap();
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tile_id"], "t-100");
        assert_eq!(lines[1]["label"], "Imagery");
    }

    #[test]
    fn test_sources_listing() {
        let catalog = Catalog {
            vectors: vec![regions_source()],
            rasters: vec![tiles_group()],
        };
        let listing: Value = serde_json::from_str(&sources(&catalog).unwrap()).unwrap();
        assert_eq!(listing["vectors"][0]["label"], "Regions");
        assert_eq!(listing["vectors"][0]["default"], true);
        assert_eq!(listing["rasters"][0]["table"], TILES_TABLE);
    }
}

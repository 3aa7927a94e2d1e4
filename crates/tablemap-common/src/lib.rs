//! Common types shared across the tablemap crates.

pub mod error;
pub mod feature;
pub mod geometry;
pub mod notify;
pub mod source;

pub use error::{TableError, TableResult};
pub use feature::{
    feature_collection, Feature, FeatureAttributes, FeatureMetadata, FeatureProperties,
    FilterValue, METADATA_NULL_VALUE,
};
pub use geometry::{Geometry, Position};
pub use notify::{CollectingNotifier, LogNotifier, Notice, NoticeKind, Notifier};
pub use source::{
    region_keys, ColumnSet, GeometryConstructor, GeometryMode, RasterSource, RasterSourceGroup,
    RegionVariables, Variable, VectorSource,
};

/// A raw row: cells in the order of the request's column list.
pub type Row = Vec<serde_json::Value>;

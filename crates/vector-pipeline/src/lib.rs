//! Vector and raster source pipeline.
//!
//! Turns rows from the table client into features, builds filter indexes
//! over their properties, and evaluates filter selections.

pub mod decode;
pub mod filter;
pub mod pipeline;
pub mod raster;

pub use decode::{decode_features, FeatureDecoder};
pub use filter::{apply_filters, build_filter_index, FilterIndex, PropertyFilter};
pub use pipeline::{default_sources, LoadedSource, SourcePipeline};
pub use raster::decode_rasters;

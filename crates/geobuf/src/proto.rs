//! Protobuf messages of the geobuf schema.
//!
//! Only the fields needed to rebuild geometry are declared; property values
//! and custom properties are skipped as unknown fields.

/// Top-level geobuf message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Data {
    #[prost(string, repeated, tag = "1")]
    pub keys: Vec<String>,
    /// Coordinate dimensions, 2 when absent.
    #[prost(uint32, optional, tag = "2")]
    pub dimensions: Option<u32>,
    /// Number of decimal digits kept, 6 when absent.
    #[prost(uint32, optional, tag = "3")]
    pub precision: Option<u32>,
    #[prost(oneof = "data::DataType", tags = "4, 5, 6")]
    pub data_type: Option<data::DataType>,
}

pub mod data {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum DataType {
        #[prost(message, tag = "4")]
        FeatureCollection(super::FeatureCollection),
        #[prost(message, tag = "5")]
        Feature(super::Feature),
        #[prost(message, tag = "6")]
        Geometry(super::Geometry),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeatureCollection {
    #[prost(message, repeated, tag = "1")]
    pub features: Vec<Feature>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Feature {
    #[prost(message, optional, tag = "1")]
    pub geometry: Option<Geometry>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Geometry {
    #[prost(enumeration = "GeometryType", optional, tag = "1")]
    pub geometry_type: Option<i32>,
    /// Ring/line lengths for multi-part geometries.
    #[prost(uint32, repeated, tag = "2")]
    pub lengths: Vec<u32>,
    /// Delta-encoded, precision-scaled coordinates.
    #[prost(sint64, repeated, tag = "3")]
    pub coords: Vec<i64>,
    #[prost(message, repeated, tag = "4")]
    pub geometries: Vec<Geometry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum GeometryType {
    Point = 0,
    MultiPoint = 1,
    LineString = 2,
    MultiLineString = 3,
    Polygon = 4,
    MultiPolygon = 5,
    GeometryCollection = 6,
}

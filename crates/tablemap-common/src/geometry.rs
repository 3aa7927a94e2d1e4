//! GeoJSON-like geometry types.
//!
//! Geometries serialize with the GeoJSON `type` tag so that raw-JSON
//! geometry cells deserialize directly into [`Geometry`].

use serde::{Deserialize, Serialize};

/// A position: `[x, y]` or `[x, y, z]`, longitude first.
pub type Position = Vec<f64>;

/// GeoJSON geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },

    MultiPoint {
        coordinates: Vec<Position>,
    },

    LineString {
        coordinates: Vec<Position>,
    },

    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },

    /// Array of linear rings (first is exterior, rest are holes).
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },

    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },

    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    /// Create a point geometry.
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: vec![lon, lat],
        }
    }

    /// Create a closed rectangular polygon from a bounding box.
    pub fn bbox_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Geometry::Polygon {
            coordinates: vec![vec![
                vec![min_x, min_y],
                vec![max_x, min_y],
                vec![max_x, max_y],
                vec![min_x, max_y],
                vec![min_x, min_y],
            ]],
        }
    }

    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }
}

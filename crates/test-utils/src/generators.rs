//! Synthetic rows and encoded geometry cells.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use geobuf::proto::{self, data::DataType, GeometryType};
use prost::Message;
use serde_json::{json, Value};
use tablemap_common::{Geometry, Position};

/// Rows of `[index, "row-{index}"]`.
///
/// The index column makes ordering across pages easy to verify.
pub fn sequential_rows(count: usize) -> Vec<Vec<Value>> {
    (0..count).map(|i| vec![json!(i), json!(format!("row-{}", i))]).collect()
}

/// Render rows as a newline-delimited JSON body.
pub fn ndjson(rows: &[Vec<Value>]) -> String {
    rows.iter()
        .map(|row| Value::Array(row.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

const PRECISION: u32 = 6;
const SCALE: f64 = 1e6;

/// Encode a geometry as a base64 geobuf cell wrapping a `Feature`.
pub fn geobuf_cell(geometry: &Geometry) -> String {
    let data = proto::Data {
        keys: Vec::new(),
        dimensions: Some(2),
        precision: Some(PRECISION),
        data_type: Some(DataType::Feature(proto::Feature {
            geometry: Some(encode_geometry(geometry)),
        })),
    };
    STANDARD.encode(data.encode_to_vec())
}

fn encode_geometry(geometry: &Geometry) -> proto::Geometry {
    let mut out = proto::Geometry::default();
    match geometry {
        Geometry::Point { coordinates } => {
            out.geometry_type = Some(GeometryType::Point as i32);
            out.coords = coordinates.iter().map(|c| scaled(*c)).collect();
        }
        Geometry::MultiPoint { coordinates } => {
            out.geometry_type = Some(GeometryType::MultiPoint as i32);
            push_line(&mut out.coords, coordinates, false);
        }
        Geometry::LineString { coordinates } => {
            out.geometry_type = Some(GeometryType::LineString as i32);
            push_line(&mut out.coords, coordinates, false);
        }
        Geometry::MultiLineString { coordinates } => {
            out.geometry_type = Some(GeometryType::MultiLineString as i32);
            for line in coordinates {
                out.lengths.push(line.len() as u32);
                push_line(&mut out.coords, line, false);
            }
        }
        Geometry::Polygon { coordinates } => {
            out.geometry_type = Some(GeometryType::Polygon as i32);
            for ring in coordinates {
                out.lengths.push(ring.len().saturating_sub(1) as u32);
                push_line(&mut out.coords, ring, true);
            }
        }
        Geometry::MultiPolygon { coordinates } => {
            out.geometry_type = Some(GeometryType::MultiPolygon as i32);
            out.lengths.push(coordinates.len() as u32);
            for polygon in coordinates {
                out.lengths.push(polygon.len() as u32);
                for ring in polygon {
                    out.lengths.push(ring.len().saturating_sub(1) as u32);
                    push_line(&mut out.coords, ring, true);
                }
            }
        }
        Geometry::GeometryCollection { geometries } => {
            out.geometry_type = Some(GeometryType::GeometryCollection as i32);
            out.geometries = geometries.iter().map(encode_geometry).collect();
        }
    }
    out
}

/// Delta-encode a line; closed rings drop their repeated last point.
fn push_line(coords: &mut Vec<i64>, line: &[Position], closed: bool) {
    let points = if closed && !line.is_empty() {
        &line[..line.len() - 1]
    } else {
        line
    };
    let mut previous = vec![0i64; 2];
    for position in points {
        for (axis, value) in position.iter().take(2).enumerate() {
            let current = scaled(*value);
            coords.push(current - previous[axis]);
            previous[axis] = current;
        }
    }
}

fn scaled(value: f64) -> i64 {
    (value * SCALE).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_rows_ndjson() {
        let body = ndjson(&sequential_rows(2));
        assert_eq!(body, "[0,\"row-0\"]\n[1,\"row-1\"]");
    }

    #[test]
    fn test_geobuf_cell_decodes_to_same_polygon() {
        let polygon = Geometry::bbox_polygon(-1.5, -2.0, 3.25, 4.0);
        let decoded = geobuf::decode_base64_geometry(&geobuf_cell(&polygon)).unwrap();
        assert_eq!(decoded, Some(polygon));
    }

    #[test]
    fn test_geobuf_cell_multi_polygon() {
        let multi = Geometry::MultiPolygon {
            coordinates: vec![
                vec![vec![
                    vec![0.0, 0.0],
                    vec![1.0, 0.0],
                    vec![1.0, 1.0],
                    vec![0.0, 0.0],
                ]],
                vec![vec![
                    vec![10.0, 10.0],
                    vec![11.0, 10.0],
                    vec![11.0, 11.0],
                    vec![10.0, 10.0],
                ]],
            ],
        };
        let decoded = geobuf::decode_base64_geometry(&geobuf_cell(&multi)).unwrap();
        assert_eq!(decoded, Some(multi));
    }
}

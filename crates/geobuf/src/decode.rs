//! Geobuf geometry reconstruction.
//!
//! Coordinates are stored as integers scaled by `10^precision`. Lines and
//! rings are delta-encoded from the previous point, restarting at zero for
//! each line. Closed rings omit their final point, which is re-added here.

use tablemap_common::{Geometry, Position};

use crate::error::{GeobufError, Result};
use crate::proto::{self, GeometryType};

const MAX_DIMENSIONS: u32 = 4;
const MAX_PRECISION: u32 = 15;

/// Decodes proto geometries under one header's dimensions and precision.
#[derive(Debug, Clone, Copy)]
pub struct GeometryDecoder {
    dim: usize,
    scale: f64,
}

impl GeometryDecoder {
    pub fn new(dimensions: u32, precision: u32) -> Result<Self> {
        if dimensions == 0 || dimensions > MAX_DIMENSIONS {
            return Err(GeobufError::InvalidHeader(format!(
                "dimensions must be 1-{}, got {}",
                MAX_DIMENSIONS, dimensions
            )));
        }
        if precision > MAX_PRECISION {
            return Err(GeobufError::InvalidHeader(format!(
                "precision must be at most {}, got {}",
                MAX_PRECISION, precision
            )));
        }
        Ok(Self {
            dim: dimensions as usize,
            scale: 10f64.powi(precision as i32),
        })
    }

    /// Decoder for a message header, applying the schema defaults.
    pub fn for_data(data: &proto::Data) -> Result<Self> {
        Self::new(data.dimensions.unwrap_or(2), data.precision.unwrap_or(6))
    }

    pub fn decode(&self, geometry: &proto::Geometry) -> Result<Geometry> {
        let raw_type = geometry.geometry_type.unwrap_or(GeometryType::Point as i32);
        let kind = GeometryType::try_from(raw_type).map_err(|_| GeobufError::UnknownType(raw_type))?;
        let coords = geometry.coords.as_slice();

        let decoded = match kind {
            GeometryType::Point => Geometry::Point {
                coordinates: self.point(coords),
            },
            GeometryType::MultiPoint => Geometry::MultiPoint {
                coordinates: self.line(coords, false)?,
            },
            GeometryType::LineString => Geometry::LineString {
                coordinates: self.line(coords, false)?,
            },
            GeometryType::MultiLineString => Geometry::MultiLineString {
                coordinates: self.multi_line(geometry, false)?,
            },
            GeometryType::Polygon => Geometry::Polygon {
                coordinates: self.multi_line(geometry, true)?,
            },
            GeometryType::MultiPolygon => Geometry::MultiPolygon {
                coordinates: self.multi_polygon(geometry)?,
            },
            GeometryType::GeometryCollection => Geometry::GeometryCollection {
                geometries: geometry
                    .geometries
                    .iter()
                    .map(|g| self.decode(g))
                    .collect::<Result<Vec<_>>>()?,
            },
        };
        Ok(decoded)
    }

    fn point(&self, coords: &[i64]) -> Position {
        coords.iter().map(|&c| c as f64 / self.scale).collect()
    }

    fn line(&self, coords: &[i64], closed: bool) -> Result<Vec<Position>> {
        if coords.len() % self.dim != 0 {
            return Err(GeobufError::Truncated {
                needed: coords.len().div_ceil(self.dim) * self.dim,
                available: coords.len(),
            });
        }

        let mut sum = vec![0i64; self.dim];
        let mut line = Vec::with_capacity(coords.len() / self.dim + usize::from(closed));
        for chunk in coords.chunks_exact(self.dim) {
            for (acc, delta) in sum.iter_mut().zip(chunk) {
                *acc = acc.wrapping_add(*delta);
            }
            line.push(self.point(&sum));
        }

        if closed {
            if let Some(first) = line.first().cloned() {
                line.push(first);
            }
        }
        Ok(line)
    }

    fn multi_line(&self, geometry: &proto::Geometry, closed: bool) -> Result<Vec<Vec<Position>>> {
        let coords = geometry.coords.as_slice();
        if geometry.lengths.is_empty() {
            return Ok(vec![self.line(coords, closed)?]);
        }

        let mut start = 0;
        let mut lines = Vec::with_capacity(geometry.lengths.len());
        for &len in &geometry.lengths {
            let part = self.take(coords, &mut start, len)?;
            lines.push(self.line(part, closed)?);
        }
        Ok(lines)
    }

    /// Lengths layout: `[polygon count, (ring count, ring lengths...)...]`.
    fn multi_polygon(&self, geometry: &proto::Geometry) -> Result<Vec<Vec<Vec<Position>>>> {
        let coords = geometry.coords.as_slice();
        let lengths = geometry.lengths.as_slice();
        if lengths.is_empty() {
            return Ok(vec![vec![self.line(coords, true)?]]);
        }

        let mut start = 0;
        let mut cursor = 1;
        // Counts come from the payload; never size allocations by them alone.
        let polygon_count = lengths[0] as usize;
        let mut polygons = Vec::with_capacity(polygon_count.min(lengths.len() - 1));

        for _ in 0..polygon_count {
            let ring_count = *lengths.get(cursor).ok_or(GeobufError::Truncated {
                needed: cursor + 1,
                available: lengths.len(),
            })? as usize;
            cursor += 1;

            let mut rings = Vec::with_capacity(ring_count.min(lengths.len() - cursor));
            for _ in 0..ring_count {
                let len = *lengths.get(cursor).ok_or(GeobufError::Truncated {
                    needed: cursor + 1,
                    available: lengths.len(),
                })?;
                cursor += 1;
                let part = self.take(coords, &mut start, len)?;
                rings.push(self.line(part, true)?);
            }
            polygons.push(rings);
        }
        Ok(polygons)
    }

    fn take<'a>(&self, coords: &'a [i64], start: &mut usize, points: u32) -> Result<&'a [i64]> {
        let end = (points as usize)
            .saturating_mul(self.dim)
            .saturating_add(*start);
        let part = coords.get(*start..end).ok_or(GeobufError::Truncated {
            needed: end,
            available: coords.len(),
        })?;
        *start = end;
        Ok(part)
    }
}

//! Declarative descriptions of fetchable datasets.
//!
//! A [`VectorSource`] names a remote table, the columns to project and how
//! to turn the geometry column(s) into a [`Geometry`]. Sources are built
//! once from configuration and never mutated; fetched results live in the
//! pipeline, keyed by source name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TableError, TableResult};
use crate::geometry::Geometry;

/// A remote column plus an optional human-readable label.
///
/// Column names are case-insensitive on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
        }
    }

    pub fn labeled(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: Some(label.into()),
        }
    }

    /// The lower-cased column name sent to the remote store.
    pub fn column(&self) -> String {
        self.name.to_lowercase()
    }

    /// Label if present, raw name otherwise.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered, de-duplicated set of lower-cased column names.
///
/// The position of a name is the index of its cell in each fetched row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnSet {
    pub fn from_variables<'a, I>(variables: I) -> Self
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        let mut set = Self::default();
        for variable in variables {
            set.insert(variable.column());
        }
        set
    }

    fn insert(&mut self, column: String) {
        if !self.positions.contains_key(&column) {
            self.positions.insert(column.clone(), self.names.len());
            self.names.push(column);
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, variable: &Variable) -> Option<usize> {
        self.positions.get(&variable.column()).copied()
    }

    /// Comma-joined list for the `selectedVariables` query parameter.
    pub fn to_query_value(&self) -> String {
        self.names.join(",")
    }
}

type BuildFn = dyn Fn(&[Value]) -> TableResult<Geometry> + Send + Sync;

/// Builds a geometry from the raw cells of every geometry variable, in
/// declared order.
#[derive(Clone)]
pub struct GeometryConstructor {
    name: String,
    build: Arc<BuildFn>,
}

impl GeometryConstructor {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&[Value]) -> TableResult<Geometry> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self, cells: &[Value]) -> TableResult<Geometry> {
        (self.build)(cells)
    }

    /// Resolve one of the built-in constructors by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "lon_lat_point" => Some(Self::lon_lat_point()),
            "lat_lon_point" => Some(Self::lat_lon_point()),
            "bounding_box" => Some(Self::bounding_box()),
            _ => None,
        }
    }

    /// Point from two cells: longitude, latitude.
    pub fn lon_lat_point() -> Self {
        Self::new("lon_lat_point", |cells| {
            let lon = number_cell(cells, 0, "longitude")?;
            let lat = number_cell(cells, 1, "latitude")?;
            Ok(Geometry::point(lon, lat))
        })
    }

    /// Point from two cells: latitude, longitude.
    pub fn lat_lon_point() -> Self {
        Self::new("lat_lon_point", |cells| {
            let lat = number_cell(cells, 0, "latitude")?;
            let lon = number_cell(cells, 1, "longitude")?;
            Ok(Geometry::point(lon, lat))
        })
    }

    /// Rectangle from a single `[minX, minY, maxX, maxY]` cell. The cell may
    /// be a JSON array, JSON text of an array, or comma-separated numbers.
    pub fn bounding_box() -> Self {
        Self::new("bounding_box", |cells| {
            let cell = cells
                .first()
                .ok_or_else(|| TableError::invalid_cell("bounding_box", "missing cell"))?;
            let [min_x, min_y, max_x, max_y] = parse_bbox(cell)?;
            Ok(Geometry::bbox_polygon(min_x, min_y, max_x, max_y))
        })
    }
}

impl fmt::Debug for GeometryConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryConstructor")
            .field("name", &self.name)
            .finish()
    }
}

fn number_cell(cells: &[Value], index: usize, what: &str) -> TableResult<f64> {
    match cells.get(index) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| TableError::invalid_cell(what, format!("{} is not finite", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| TableError::invalid_cell(what, format!("'{}' is not a number", s))),
        Some(other) => Err(TableError::invalid_cell(
            what,
            format!("expected a number, got {}", other),
        )),
        None => Err(TableError::invalid_cell(what, "missing cell")),
    }
}

fn parse_bbox(cell: &Value) -> TableResult<[f64; 4]> {
    let values: Vec<Value> = match cell {
        Value::Array(items) => items.clone(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => items,
            _ => text
                .split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        },
        other => {
            return Err(TableError::invalid_cell(
                "bounding_box",
                format!("expected 4 numbers, got {}", other),
            ))
        }
    };

    if values.len() != 4 {
        return Err(TableError::invalid_cell(
            "bounding_box",
            format!("expected 4 numbers, got {}", values.len()),
        ));
    }

    let mut bbox = [0.0; 4];
    for (i, slot) in bbox.iter_mut().enumerate() {
        *slot = number_cell(&values, i, "bounding_box")?;
    }
    Ok(bbox)
}

/// How the geometry cell(s) of a row become a geometry.
#[derive(Debug, Clone)]
pub enum GeometryMode {
    /// The primary cell is GeoJSON geometry text.
    Json,
    /// The primary cell is base64 text wrapping a geobuf payload.
    Geobuf,
    /// All geometry cells are handed to a constructor.
    Custom(GeometryConstructor),
}

impl Default for GeometryMode {
    fn default() -> Self {
        GeometryMode::Json
    }
}

/// Optional region-hierarchy variables, surfaced as synthesized properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionVariables {
    #[serde(default)]
    pub name: Option<Variable>,
    #[serde(default)]
    pub parent: Option<Variable>,
    #[serde(default)]
    pub bounding_box: Option<Variable>,
}

impl RegionVariables {
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        [&self.name, &self.parent, &self.bounding_box]
            .into_iter()
            .flatten()
    }
}

/// Property keys synthesized from region variables.
pub mod region_keys {
    pub const NAME: &str = "regionName";
    pub const PARENT: &str = "parentRegionName";
    pub const BOUNDING_BOX: &str = "bbox";
}

/// Immutable descriptor of one vector dataset.
#[derive(Debug, Clone)]
pub struct VectorSource {
    pub name: String,
    pub label: Option<String>,
    pub table_identifier: String,
    pub geo_variables: Vec<Variable>,
    pub geometry_mode: GeometryMode,
    pub metadata_variables: Vec<Variable>,
    pub filter_variables: Vec<Variable>,
    pub region: RegionVariables,
    pub is_default: bool,
}

impl VectorSource {
    pub fn new(name: impl Into<String>, table_identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            table_identifier: table_identifier.into(),
            geo_variables: Vec::new(),
            geometry_mode: GeometryMode::Json,
            metadata_variables: Vec::new(),
            filter_variables: Vec::new(),
            region: RegionVariables::default(),
            is_default: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_geometry(mut self, mode: GeometryMode, variables: Vec<Variable>) -> Self {
        self.geometry_mode = mode;
        self.geo_variables = variables;
        self
    }

    pub fn with_metadata_variables(mut self, variables: Vec<Variable>) -> Self {
        self.metadata_variables = variables;
        self
    }

    pub fn with_filter_variables(mut self, variables: Vec<Variable>) -> Self {
        self.filter_variables = variables;
        self
    }

    pub fn with_region(mut self, region: RegionVariables) -> Self {
        self.region = region;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Check that the descriptor can be fetched and decoded.
    pub fn validate(&self) -> TableResult<()> {
        if self.table_identifier.trim().is_empty() {
            return Err(TableError::invalid_source(&self.name, "table identifier is empty"));
        }
        if self.geo_variables.is_empty() {
            return Err(TableError::invalid_source(
                &self.name,
                "at least one geometry variable is required",
            ));
        }
        if matches!(self.geometry_mode, GeometryMode::Json | GeometryMode::Geobuf)
            && self.geo_variables.len() > 1
        {
            tracing::warn!(
                source = %self.name,
                count = self.geo_variables.len(),
                "Only the first geometry variable is decoded outside custom mode"
            );
        }
        Ok(())
    }

    /// Columns for the metadata request: filter variables, metadata
    /// variables, then region variables.
    pub fn metadata_columns(&self) -> ColumnSet {
        ColumnSet::from_variables(
            self.filter_variables
                .iter()
                .chain(self.metadata_variables.iter())
                .chain(self.region.iter()),
        )
    }

    /// Columns for the geometry request.
    pub fn geometry_columns(&self) -> ColumnSet {
        ColumnSet::from_variables(self.geo_variables.iter())
    }

    /// Whitelist for the filter index.
    pub fn filter_names(&self) -> Vec<String> {
        self.filter_variables.iter().map(|v| v.name.clone()).collect()
    }
}

/// A table of raster tile sets, one row per raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterSourceGroup {
    pub name: String,
    pub table_identifier: String,
    pub tile_id_variable: Variable,
    pub min_native_zoom_variable: Variable,
    pub max_native_zoom_variable: Variable,
    pub bounding_box_variable: Variable,
    pub name_variable: Variable,
}

impl RasterSourceGroup {
    pub fn columns(&self) -> ColumnSet {
        ColumnSet::from_variables([
            &self.tile_id_variable,
            &self.min_native_zoom_variable,
            &self.max_native_zoom_variable,
            &self.bounding_box_variable,
            &self.name_variable,
        ])
    }
}

/// One raster tile set decoded from a group row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSource {
    pub tile_id: Value,
    pub min_native_zoom: Value,
    pub max_native_zoom: Value,
    pub bounding_box: Value,
    pub name: Value,
    /// Name of the group the raster came from.
    pub label: String,
}

//! Source catalog loading.
//!
//! A catalog is a YAML file listing vector sources and raster groups.
//! Supports environment variable substitution using ${VAR} syntax.
//!
//! ```yaml
//! vectors:
//!   - name: regions
//!     label: Regions
//!     table: demo.regions
//!     geometry:
//!       mode: json            # json | geobuf | custom
//!       variables: [geom]
//!     metadata:
//!       - name: population
//!         label: Population
//!     filters: [state]
//!     region:
//!       name: name
//!       parent: state
//!     default: true
//! rasters:
//!   - name: Imagery
//!     table: ${IMAGERY_TABLE:-demo.tiles}
//!     tile_id: tile_id
//!     min_native_zoom: min_zoom
//!     max_native_zoom: max_zoom
//!     bounding_box: bbox
//!     title: title
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tablemap_common::{
    GeometryConstructor, GeometryMode, RasterSourceGroup, RegionVariables, Variable, VectorSource,
};

// ============================================================================
// YAML Structures
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub vectors: Vec<VectorEntry>,
    #[serde(default)]
    pub rasters: Vec<RasterEntry>,
}

/// A variable written either as a bare name or as `{name, label}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VariableEntry {
    Name(String),
    Labeled {
        name: String,
        #[serde(default)]
        label: Option<String>,
    },
}

impl VariableEntry {
    fn to_variable(&self) -> Variable {
        match self {
            VariableEntry::Name(name) => Variable::new(name.as_str()),
            VariableEntry::Labeled { name, label: None } => Variable::new(name.as_str()),
            VariableEntry::Labeled {
                name,
                label: Some(label),
            } => Variable::labeled(name.as_str(), label.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeEntry {
    #[default]
    Json,
    Geobuf,
    Custom,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryEntry {
    #[serde(default)]
    pub mode: ModeEntry,
    /// Built-in constructor name, required for `custom`.
    #[serde(default)]
    pub constructor: Option<String>,
    pub variables: Vec<VariableEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionEntry {
    #[serde(default)]
    pub name: Option<VariableEntry>,
    #[serde(default)]
    pub parent: Option<VariableEntry>,
    #[serde(default)]
    pub bounding_box: Option<VariableEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub table: String,
    pub geometry: GeometryEntry,
    #[serde(default)]
    pub metadata: Vec<VariableEntry>,
    #[serde(default)]
    pub filters: Vec<VariableEntry>,
    #[serde(default)]
    pub region: RegionEntry,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RasterEntry {
    pub name: String,
    pub table: String,
    pub tile_id: VariableEntry,
    pub min_native_zoom: VariableEntry,
    pub max_native_zoom: VariableEntry,
    pub bounding_box: VariableEntry,
    pub title: VariableEntry,
}

// ============================================================================
// Runtime Catalog
// ============================================================================

/// Validated sources ready for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub vectors: Vec<VectorSource>,
    pub rasters: Vec<RasterSourceGroup>,
}

impl Catalog {
    pub fn vector(&self, name: &str) -> Option<&VectorSource> {
        self.vectors.iter().find(|s| s.name == name)
    }

    /// Resolve `names` to sources; an empty selection means the defaults.
    pub fn select(&self, names: &[String]) -> Result<Vec<VectorSource>> {
        if names.is_empty() {
            return Ok(vector_pipeline::default_sources(&self.vectors));
        }
        names
            .iter()
            .map(|name| {
                self.vector(name)
                    .cloned()
                    .with_context(|| format!("Unknown vector source: {}", name))
            })
            .collect()
    }
}

impl TryFrom<CatalogFile> for Catalog {
    type Error = anyhow::Error;

    fn try_from(file: CatalogFile) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut vectors = Vec::with_capacity(file.vectors.len());
        for entry in &file.vectors {
            if !seen.insert(entry.name.as_str()) {
                bail!("Duplicate vector source name: {}", entry.name);
            }
            vectors.push(convert_vector(entry)?);
        }

        let rasters = file.rasters.iter().map(convert_raster).collect();
        Ok(Self { vectors, rasters })
    }
}

fn convert_vector(entry: &VectorEntry) -> Result<VectorSource> {
    let mode = match entry.geometry.mode {
        ModeEntry::Json => GeometryMode::Json,
        ModeEntry::Geobuf => GeometryMode::Geobuf,
        ModeEntry::Custom => {
            let name = entry.geometry.constructor.as_deref().with_context(|| {
                format!("Source {} uses custom geometry without a constructor", entry.name)
            })?;
            let constructor = GeometryConstructor::builtin(name).with_context(|| {
                format!("Source {}: unknown geometry constructor {}", entry.name, name)
            })?;
            GeometryMode::Custom(constructor)
        }
    };

    let variables = |entries: &[VariableEntry]| -> Vec<Variable> {
        entries.iter().map(VariableEntry::to_variable).collect()
    };

    let mut source = VectorSource::new(entry.name.as_str(), entry.table.as_str())
        .with_geometry(mode, variables(&entry.geometry.variables))
        .with_metadata_variables(variables(&entry.metadata))
        .with_filter_variables(variables(&entry.filters))
        .with_region(RegionVariables {
            name: entry.region.name.as_ref().map(VariableEntry::to_variable),
            parent: entry.region.parent.as_ref().map(VariableEntry::to_variable),
            bounding_box: entry.region.bounding_box.as_ref().map(VariableEntry::to_variable),
        });
    if let Some(label) = &entry.label {
        source = source.with_label(label.as_str());
    }
    if entry.default {
        source = source.as_default();
    }

    source
        .validate()
        .with_context(|| format!("Invalid vector source {}", entry.name))?;
    Ok(source)
}

fn convert_raster(entry: &RasterEntry) -> RasterSourceGroup {
    RasterSourceGroup {
        name: entry.name.clone(),
        table_identifier: entry.table.clone(),
        tile_id_variable: entry.tile_id.to_variable(),
        min_native_zoom_variable: entry.min_native_zoom.to_variable(),
        max_native_zoom_variable: entry.max_native_zoom.to_variable(),
        bounding_box_variable: entry.bounding_box.to_variable(),
        name_variable: entry.title.to_variable(),
    }
}

// ============================================================================
// Loading Functions
// ============================================================================

/// Load and validate a catalog file with environment variable substitution.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read catalog from {:?}", path.as_ref()))?;
    parse_catalog(&content)
        .with_context(|| format!("Failed to load catalog from {:?}", path.as_ref()))
}

pub fn parse_catalog(content: &str) -> Result<Catalog> {
    let expanded = expand_env_vars(content)?;
    let file: CatalogFile =
        serde_yaml::from_str(&expanded).context("Failed to parse catalog YAML")?;
    Catalog::try_from(file)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand ${VAR} and ${VAR:-default}.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut expr = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) => expr.push(c),
                None => bail!("Unclosed variable substitution: ${{{}", expr),
            }
        }
        result.push_str(&resolve_var_expr(&expr)?);
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => match std::env::var(name.trim()) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Ok(default.to_string()),
        },
        None => std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr)),
    }
}

//! Common source descriptors and matching synthetic tables.
//!
//! Each `*_source()` describes a table that the paired `*_table()` serves,
//! so a test can register the table on a [`MockTableServer`] and fetch it
//! through the source.
//!
//! [`MockTableServer`]: crate::MockTableServer

use serde_json::{json, Value};
use tablemap_common::{
    Geometry, GeometryConstructor, GeometryMode, RasterSourceGroup, RegionVariables, Variable,
    VectorSource,
};

use crate::generators::geobuf_cell;
use crate::mock_api::MockTable;

pub const REGIONS_TABLE: &str = "demo.regions";
pub const STATIONS_TABLE: &str = "demo.stations";
pub const PARCELS_TABLE: &str = "demo.parcels";
pub const TILES_TABLE: &str = "demo.tiles";

/// Regions with raw GeoJSON geometry, a filterable state and region keys.
pub fn regions_source() -> VectorSource {
    VectorSource::new("regions", REGIONS_TABLE)
        .with_label("Regions")
        .with_geometry(GeometryMode::Json, vec![Variable::new("geom")])
        .with_metadata_variables(vec![
            Variable::labeled("name", "Region"),
            Variable::labeled("population", "Population"),
        ])
        .with_filter_variables(vec![Variable::new("state")])
        .with_region(RegionVariables {
            name: Some(Variable::new("name")),
            parent: Some(Variable::new("state")),
            bounding_box: None,
        })
        .as_default()
}

/// Four regions; the last has no geometry and a null state.
pub fn regions_table() -> MockTable {
    let square = |x: f64| Geometry::bbox_polygon(x, 0.0, x + 1.0, 1.0);
    let geom_text = |g: &Geometry| Value::String(serde_json::to_string(g).unwrap_or_default());

    MockTable::new("regions-v1", &["Name", "State", "Population", "Geom"]).with_rows(vec![
        vec![json!("Alameda"), json!("CA"), json!(1_650_000), geom_text(&square(0.0))],
        vec![json!("Marin"), json!("CA"), json!(260_000), geom_text(&square(1.0))],
        vec![json!("Washoe"), json!("NV"), json!(490_000), geom_text(&square(2.0))],
        vec![json!("Unassigned"), Value::Null, json!(0), Value::Null],
    ])
}

/// Stations whose geometry is built from separate longitude/latitude columns.
pub fn stations_source() -> VectorSource {
    VectorSource::new("stations", STATIONS_TABLE)
        .with_geometry(
            GeometryMode::Custom(GeometryConstructor::lon_lat_point()),
            vec![Variable::new("lon"), Variable::new("lat")],
        )
        .with_metadata_variables(vec![Variable::labeled("station_id", "Station")])
        .with_filter_variables(vec![Variable::new("network")])
}

pub fn stations_table() -> MockTable {
    MockTable::new("stations-v1", &["station_id", "network", "lon", "lat"]).with_rows(vec![
        vec![json!("KSFO"), json!("ASOS"), json!(-122.375), json!(37.619)],
        vec![json!("KOAK"), json!("ASOS"), json!(-122.221), json!(37.721)],
        vec![json!("C0001"), json!("CWOP"), json!(-121.5), json!(38.25)],
    ])
}

/// Parcels carrying geobuf-encoded polygons.
pub fn parcels_source() -> VectorSource {
    VectorSource::new("parcels", PARCELS_TABLE)
        .with_geometry(GeometryMode::Geobuf, vec![Variable::new("shape")])
        .with_metadata_variables(vec![Variable::labeled("parcel_id", "Parcel")])
}

pub fn parcels_table() -> MockTable {
    MockTable::new("parcels-v1", &["parcel_id", "shape"]).with_rows(vec![
        vec![
            json!("P-1"),
            json!(geobuf_cell(&Geometry::bbox_polygon(0.0, 0.0, 0.5, 0.5))),
        ],
        vec![
            json!("P-2"),
            json!(geobuf_cell(&Geometry::bbox_polygon(0.5, 0.5, 1.0, 1.0))),
        ],
    ])
}

pub fn tiles_group() -> RasterSourceGroup {
    RasterSourceGroup {
        name: "Imagery".to_string(),
        table_identifier: TILES_TABLE.to_string(),
        tile_id_variable: Variable::new("tile_id"),
        min_native_zoom_variable: Variable::new("min_zoom"),
        max_native_zoom_variable: Variable::new("max_zoom"),
        bounding_box_variable: Variable::new("bbox"),
        name_variable: Variable::new("title"),
    }
}

pub fn tiles_table() -> MockTable {
    MockTable::new(
        "tiles-v1",
        &["tile_id", "min_zoom", "max_zoom", "bbox", "title"],
    )
    .with_rows(vec![
        vec![
            json!("t-100"),
            json!(4),
            json!(12),
            json!("[-123.0,37.0,-121.0,38.5]"),
            json!("Bay Area 2021"),
        ],
        vec![
            json!("t-200"),
            json!(6),
            json!(14),
            json!("[-120.0,38.0,-119.0,39.5]"),
            json!("Tahoe 2022"),
        ],
    ])
}

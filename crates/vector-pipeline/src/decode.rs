//! Feature decoding from metadata and geometry rows.
//!
//! Metadata and geometry are fetched as two separate row sets for the same
//! table. Row `i` of each describes feature `i`.

use serde_json::Value;
use tablemap_common::{
    region_keys, ColumnSet, Feature, FeatureAttributes, Geometry, GeometryMode, Row, TableError,
    TableResult, Variable, VectorSource,
};

/// Decodes rows of one source into features.
#[derive(Debug)]
pub struct FeatureDecoder<'a> {
    source: &'a VectorSource,
    metadata_columns: ColumnSet,
    geometry_columns: ColumnSet,
}

impl<'a> FeatureDecoder<'a> {
    pub fn new(source: &'a VectorSource) -> Self {
        Self {
            source,
            metadata_columns: source.metadata_columns(),
            geometry_columns: source.geometry_columns(),
        }
    }

    /// Project one metadata row into metadata and properties.
    ///
    /// Metadata is keyed by label. Properties hold the metadata plus every
    /// filter variable by name and the synthesized region keys. Cells that
    /// cannot be resolved are `null`.
    pub fn decode_attributes(&self, row: &Row) -> FeatureAttributes {
        let mut attributes = FeatureAttributes::default();

        for variable in &self.source.metadata_variables {
            attributes
                .metadata
                .insert(variable.display_name().to_string(), self.metadata_cell(row, variable));
        }

        attributes.properties = attributes.metadata.clone();
        for variable in &self.source.filter_variables {
            attributes
                .properties
                .insert(variable.name.clone(), self.metadata_cell(row, variable));
        }

        let region = &self.source.region;
        for (key, variable) in [
            (region_keys::NAME, &region.name),
            (region_keys::PARENT, &region.parent),
            (region_keys::BOUNDING_BOX, &region.bounding_box),
        ] {
            if let Some(variable) = variable {
                attributes
                    .properties
                    .insert(key.to_string(), self.metadata_cell(row, variable));
            }
        }

        attributes
    }

    /// Decode the geometry of one geometry row.
    ///
    /// An empty or null primary cell is a feature without geometry.
    pub fn decode_geometry(&self, row: &Row) -> TableResult<Option<Geometry>> {
        let primary = self
            .source
            .geo_variables
            .first()
            .map(|v| cell(row, self.geometry_columns.position(v)))
            .unwrap_or(Value::Null);

        match &primary {
            Value::Null => return Ok(None),
            Value::String(text) if text.trim().is_empty() => return Ok(None),
            _ => {}
        }

        let geometry = match &self.source.geometry_mode {
            GeometryMode::Json => parse_json_geometry(primary)?,
            GeometryMode::Geobuf => match &primary {
                // A geobuf feature may legitimately carry no geometry.
                Value::String(text) => match geobuf::decode_base64_geometry(text)? {
                    Some(geometry) => geometry,
                    None => return Ok(None),
                },
                other => {
                    return Err(TableError::GeometryDecode(format!(
                        "expected base64 text, got {}",
                        other
                    )))
                }
            },
            GeometryMode::Custom(constructor) => {
                let cells: Vec<Value> = self
                    .source
                    .geo_variables
                    .iter()
                    .map(|v| cell(row, self.geometry_columns.position(v)))
                    .collect();
                constructor.build(&cells)?
            }
        };
        Ok(Some(geometry))
    }

    /// Zip metadata and geometry rows into features.
    ///
    /// One feature per geometry row. A geometry row past the end of the
    /// metadata rows yields a feature without attributes. Any geometry error
    /// fails the whole set.
    pub fn decode(&self, metadata_rows: &[Row], geometry_rows: &[Row]) -> TableResult<Vec<Feature>> {
        let attributes: Vec<FeatureAttributes> = metadata_rows
            .iter()
            .map(|row| self.decode_attributes(row))
            .collect();
        self.decode_with_attributes(&attributes, geometry_rows)
    }

    /// Like [`decode`](Self::decode) with the metadata rows already decoded.
    pub fn decode_with_attributes(
        &self,
        attributes: &[FeatureAttributes],
        geometry_rows: &[Row],
    ) -> TableResult<Vec<Feature>> {
        geometry_rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let geometry = self
                    .decode_geometry(row)
                    .map_err(|e| with_row(e, index))?;
                Ok(Feature::new(geometry, attributes.get(index).cloned()))
            })
            .collect()
    }

    fn metadata_cell(&self, row: &Row, variable: &Variable) -> Value {
        cell(row, self.metadata_columns.position(variable))
    }
}

/// Decode one source's rows. See [`FeatureDecoder::decode`].
pub fn decode_features(
    source: &VectorSource,
    metadata_rows: &[Row],
    geometry_rows: &[Row],
) -> TableResult<Vec<Feature>> {
    FeatureDecoder::new(source).decode(metadata_rows, geometry_rows)
}

fn cell(row: &Row, position: Option<usize>) -> Value {
    position
        .and_then(|p| row.get(p))
        .cloned()
        .unwrap_or(Value::Null)
}

fn parse_json_geometry(cell: Value) -> TableResult<Geometry> {
    let parsed = match cell {
        Value::String(text) => serde_json::from_str(&text),
        object @ Value::Object(_) => serde_json::from_value(object),
        other => {
            return Err(TableError::GeometryDecode(format!(
                "expected GeoJSON geometry, got {}",
                other
            )))
        }
    };
    parsed.map_err(|e| TableError::GeometryDecode(format!("invalid GeoJSON geometry: {}", e)))
}

fn with_row(err: TableError, index: usize) -> TableError {
    match err {
        TableError::GeometryDecode(message) => {
            TableError::GeometryDecode(format!("row {}: {}", index, message))
        }
        TableError::InvalidCell { variable, message } => TableError::InvalidCell {
            variable,
            message: format!("row {}: {}", index, message),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablemap_common::{GeometryConstructor, RegionVariables};

    fn source(mode: GeometryMode, geo: Vec<Variable>) -> VectorSource {
        VectorSource::new("test", "t")
            .with_geometry(mode, geo)
            .with_metadata_variables(vec![Variable::labeled("name", "Name"), Variable::new("kind")])
            .with_filter_variables(vec![Variable::new("state")])
            .with_region(RegionVariables {
                name: Some(Variable::new("name")),
                parent: None,
                bounding_box: Some(Variable::new("extent")),
            })
    }

    #[test]
    fn test_attributes_keyed_by_label_and_name() {
        let s = source(GeometryMode::Json, vec![Variable::new("geom")]);
        let decoder = FeatureDecoder::new(&s);
        // Columns: state, name, kind, extent
        let attrs = decoder.decode_attributes(&vec![
            json!("CA"),
            json!("Alameda"),
            json!("county"),
            json!("[0,0,1,1]"),
        ]);

        assert_eq!(attrs.metadata.get("Name"), Some(&json!("Alameda")));
        assert_eq!(attrs.metadata.get("kind"), Some(&json!("county")));
        assert!(!attrs.metadata.contains_key("state"));

        assert_eq!(attrs.properties.get("state"), Some(&json!("CA")));
        assert_eq!(attrs.properties.get("regionName"), Some(&json!("Alameda")));
        assert_eq!(attrs.properties.get("bbox"), Some(&json!("[0,0,1,1]")));
        assert!(!attrs.properties.contains_key("parentRegionName"));
    }

    #[test]
    fn test_short_row_yields_null_cells() {
        let s = source(GeometryMode::Json, vec![Variable::new("geom")]);
        let attrs = FeatureDecoder::new(&s).decode_attributes(&vec![json!("CA")]);
        assert_eq!(attrs.metadata.get("Name"), Some(&Value::Null));
        assert_eq!(attrs.properties.get("bbox"), Some(&Value::Null));
    }

    #[test]
    fn test_json_geometry_from_text_or_object() {
        let s = source(GeometryMode::Json, vec![Variable::new("geom")]);
        let decoder = FeatureDecoder::new(&s);

        let text = decoder
            .decode_geometry(&vec![json!("{\"type\":\"Point\",\"coordinates\":[1,2]}")])
            .unwrap();
        let object = decoder
            .decode_geometry(&vec![json!({"type": "Point", "coordinates": [1, 2]})])
            .unwrap();

        assert_eq!(text, Some(Geometry::point(1.0, 2.0)));
        assert_eq!(text, object);
    }

    #[test]
    fn test_empty_primary_cell_has_no_geometry() {
        let s = source(GeometryMode::Geobuf, vec![Variable::new("geom")]);
        let decoder = FeatureDecoder::new(&s);
        assert_eq!(decoder.decode_geometry(&vec![Value::Null]).unwrap(), None);
        assert_eq!(decoder.decode_geometry(&vec![json!("")]).unwrap(), None);
        assert_eq!(decoder.decode_geometry(&vec![]).unwrap(), None);
    }

    #[test]
    fn test_geobuf_feature_without_geometry() {
        let s = source(GeometryMode::Geobuf, vec![Variable::new("geom")]);
        // Data { feature: Feature {} }
        let geometry = FeatureDecoder::new(&s)
            .decode_geometry(&vec![json!("KgA=")])
            .unwrap();
        assert_eq!(geometry, None);
    }

    #[test]
    fn test_custom_constructor_gets_cells_in_declared_order() {
        let s = source(
            GeometryMode::Custom(GeometryConstructor::lat_lon_point()),
            vec![Variable::new("Lat"), Variable::new("lon")],
        );
        let geometry = FeatureDecoder::new(&s)
            .decode_geometry(&vec![json!(37.5), json!(-122.25)])
            .unwrap();
        assert_eq!(geometry, Some(Geometry::point(-122.25, 37.5)));
    }

    #[test]
    fn test_one_bad_row_fails_the_set() {
        let s = source(GeometryMode::Json, vec![Variable::new("geom")]);
        let geometry_rows = vec![
            vec![json!("{\"type\":\"Point\",\"coordinates\":[1,2]}")],
            vec![json!("{broken")],
        ];
        let err = decode_features(&s, &[], &geometry_rows).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_geometry_rows_beyond_metadata_have_no_attributes() {
        let s = source(GeometryMode::Json, vec![Variable::new("geom")]);
        let metadata_rows = vec![vec![json!("CA"), json!("A"), json!("x"), Value::Null]];
        let geometry_rows = vec![vec![Value::Null], vec![Value::Null]];

        let features = decode_features(&s, &metadata_rows, &geometry_rows).unwrap();
        assert_eq!(features.len(), 2);
        assert!(features[0].attributes.is_some());
        assert!(features[1].attributes.is_none());
    }
}

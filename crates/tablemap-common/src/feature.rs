//! Decoded feature records and filterable values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};

use crate::geometry::Geometry;

/// Display form of the null-sentinel.
pub const METADATA_NULL_VALUE: &str = "(null)";

/// Human label (or raw name when unlabeled) -> value.
pub type FeatureMetadata = BTreeMap<String, Value>;

/// Variable name -> value; the surface filters match against.
pub type FeatureProperties = BTreeMap<String, Value>;

/// Attributes decoded from one metadata row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttributes {
    pub metadata: FeatureMetadata,
    pub properties: FeatureProperties,
}

/// A decoded feature: geometry plus the attributes of the same row index.
///
/// `attributes` is `None` when no metadata row exists for the feature's
/// index; such features pass every filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub attributes: Option<FeatureAttributes>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, attributes: Option<FeatureAttributes>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    pub fn metadata(&self) -> Option<&FeatureMetadata> {
        self.attributes.as_ref().map(|a| &a.metadata)
    }

    pub fn properties(&self) -> Option<&FeatureProperties> {
        self.attributes.as_ref().map(|a| &a.properties)
    }

    /// Look up a filterable property. `None` means the property is absent.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().and_then(|p| p.get(name))
    }

    /// Render as a GeoJSON Feature object.
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "geometry": self.geometry,
            "properties": self.properties(),
        })
    }
}

/// Render features as a GeoJSON FeatureCollection.
pub fn feature_collection<'a, I>(features: I) -> Value
where
    I: IntoIterator<Item = &'a Feature>,
{
    let features: Vec<Value> = features.into_iter().map(Feature::to_geojson).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// A hashable metadata value as tracked by filter indexes.
///
/// `Null` is the null-sentinel: JSON null, absent cells and empty strings
/// all map to it so it can be selected like any other value. This is not a
/// truthiness test: `0` and `false` stay ordinary values and are listed
/// separately from `(null)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    /// Arrays and objects, keyed by their JSON text.
    Json(String),
}

impl FilterValue {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => FilterValue::Null,
            Some(Value::String(s)) if s.is_empty() => FilterValue::Null,
            Some(Value::String(s)) => FilterValue::Text(s.clone()),
            Some(Value::Bool(b)) => FilterValue::Bool(*b),
            Some(Value::Number(n)) => FilterValue::Number(n.clone()),
            Some(other) => FilterValue::Json(other.to_string()),
        }
    }

    /// Parse a user-supplied selection. `(null)` names the sentinel;
    /// anything that parses as a JSON scalar is taken as that scalar,
    /// everything else as text.
    pub fn parse(input: &str) -> Self {
        if input == METADATA_NULL_VALUE {
            return FilterValue::Null;
        }
        match serde_json::from_str::<Value>(input) {
            Ok(Value::String(_)) | Err(_) => FilterValue::Text(input.to_string()),
            Ok(value) => FilterValue::from_value(Some(&value)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }
}

impl From<&Value> for FilterValue {
    fn from(value: &Value) -> Self {
        FilterValue::from_value(Some(value))
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Null => write!(f, "{}", METADATA_NULL_VALUE),
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Text(s) | FilterValue::Json(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_map_to_sentinel() {
        assert_eq!(FilterValue::from_value(None), FilterValue::Null);
        assert_eq!(FilterValue::from_value(Some(&Value::Null)), FilterValue::Null);
        assert_eq!(FilterValue::from_value(Some(&json!(""))), FilterValue::Null);
    }

    #[test]
    fn test_zero_and_false_are_ordinary_values() {
        assert_eq!(
            FilterValue::from_value(Some(&json!(0))),
            FilterValue::Number(0.into())
        );
        assert_eq!(
            FilterValue::from_value(Some(&json!(false))),
            FilterValue::Bool(false)
        );
    }

    #[test]
    fn test_number_and_text_do_not_collide() {
        assert_ne!(
            FilterValue::from_value(Some(&json!(1))),
            FilterValue::from_value(Some(&json!("1")))
        );
    }

    #[test]
    fn test_parse_user_selection() {
        assert_eq!(FilterValue::parse("(null)"), FilterValue::Null);
        assert_eq!(FilterValue::parse("42"), FilterValue::Number(42.into()));
        assert_eq!(FilterValue::parse("true"), FilterValue::Bool(true));
        assert_eq!(
            FilterValue::parse("California"),
            FilterValue::Text("California".into())
        );
    }

    #[test]
    fn test_feature_without_attributes_serializes_null_properties() {
        let feature = Feature::new(Some(Geometry::point(1.0, 2.0)), None);
        let json = feature.to_geojson();
        assert_eq!(json["type"], "Feature");
        assert!(json["properties"].is_null());
        assert_eq!(json["geometry"]["type"], "Point");
    }
}

//! Raster source groups: one table row per raster tile set.

use serde_json::Value;
use tablemap_common::{RasterSource, RasterSourceGroup, Row, Variable};

/// Map group rows to raster sources, labeled with the group name.
///
/// Cells that cannot be resolved are `null`.
pub fn decode_rasters(group: &RasterSourceGroup, rows: &[Row]) -> Vec<RasterSource> {
    let columns = group.columns();
    let position = |variable: &Variable| columns.position(variable);
    let tile_id = position(&group.tile_id_variable);
    let min_zoom = position(&group.min_native_zoom_variable);
    let max_zoom = position(&group.max_native_zoom_variable);
    let bounding_box = position(&group.bounding_box_variable);
    let name = position(&group.name_variable);

    rows.iter()
        .map(|row| {
            let cell = |p: Option<usize>| p.and_then(|p| row.get(p)).cloned().unwrap_or(Value::Null);
            RasterSource {
                tile_id: cell(tile_id),
                min_native_zoom: cell(min_zoom),
                max_native_zoom: cell(max_zoom),
                bounding_box: cell(bounding_box),
                name: cell(name),
                label: group.name.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shared_column_fills_both_fields() {
        let group = RasterSourceGroup {
            name: "Scans".to_string(),
            table_identifier: "t".to_string(),
            tile_id_variable: Variable::new("id"),
            min_native_zoom_variable: Variable::new("zoom"),
            max_native_zoom_variable: Variable::new("ZOOM"),
            bounding_box_variable: Variable::new("bbox"),
            name_variable: Variable::new("id"),
        };
        // Columns after de-duplication: id, zoom, bbox
        let rasters = decode_rasters(&group, &[vec![json!("s-1"), json!(8), json!([0, 0, 1, 1])]]);

        assert_eq!(rasters.len(), 1);
        let r = &rasters[0];
        assert_eq!(r.tile_id, json!("s-1"));
        assert_eq!(r.name, json!("s-1"));
        assert_eq!(r.min_native_zoom, json!(8));
        assert_eq!(r.max_native_zoom, json!(8));
        assert_eq!(r.bounding_box, json!([0, 0, 1, 1]));
        assert_eq!(r.label, "Scans");
    }
}

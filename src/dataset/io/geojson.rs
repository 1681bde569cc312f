use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    dataset::{column::{Column, GeometryRef}, dataset::Dataset},
    error::Result,
};
use super::TableSchema;

pub(crate) const GEOMETRY_COLUMN: &str = "geometry";

/// GeoJSON FeatureCollection: the code comes from a feature property, the geometry is kept as
/// its serialized JSON, other properties become numeric columns when every value is a number.
pub(super) fn read_geojson_dataset(bytes: &[u8], schema: &TableSchema<'_>) -> Result<Dataset> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| schema.invalid(format!("Failed to parse GeoJSON: {err}")))?;
    if value["type"].as_str() != Some("FeatureCollection") {
        return Err(schema.invalid("expected a GeoJSON FeatureCollection"));
    }
    let features = value["features"].as_array()
        .ok_or_else(|| schema.invalid("FeatureCollection has no features array"))?;

    let empty = Map::new();
    let mut codes = Vec::with_capacity(features.len());
    let mut geometries = Vec::with_capacity(features.len());
    let mut properties = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let props = feature["properties"].as_object().unwrap_or(&empty);
        let code = props.get(schema.code_column)
            .and_then(scalar_text)
            .ok_or_else(|| schema.invalid(format!("feature {i} has no {:?} property", schema.code_column)))?;
        codes.push(code);
        geometries.push(match &feature["geometry"] {
            Value::Null => None,
            geometry => Some(GeometryRef::new(geometry.to_string())),
        });
        properties.push(props);
    }

    let selected: Vec<String> = if schema.value_columns.is_empty() {
        let mut names: Vec<String> = Vec::new();
        for props in &properties {
            for key in props.keys() {
                if key != schema.code_column && !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names
    } else {
        schema.value_columns.to_vec()
    };

    let mut columns = vec![Column::geometry(schema.output_name(GEOMETRY_COLUMN), geometries)];
    for name in &selected {
        if !properties.iter().any(|props| props.contains_key(name)) {
            return Err(schema.invalid(format!("property {name:?} not found")));
        }
        let cells: Vec<Option<&Value>> = properties.iter()
            .map(|props| props.get(name).filter(|v| !v.is_null()))
            .collect();
        let column = if cells.iter().flatten().all(|v| v.is_number()) {
            Column::numeric(schema.output_name(name), cells.iter().map(|v| v.and_then(Value::as_f64)).collect())
        } else {
            Column::categorical(
                schema.output_name(name),
                cells.iter().map(|v| v.and_then(scalar_text).map(Arc::from)).collect(),
            )
        };
        columns.push(column);
    }

    Dataset::new(schema.name, schema.vintage.clone(), schema.granularity, codes, columns)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{area::{Granularity, Vintage}, dataset::column::{ColumnKind, Value as Cell}};

    const LADS: &[u8] = br#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"LAD21CD": "E09000013", "LAD21NM": "Hammersmith and Fulham", "AREA": 16.4},
             "geometry": {"type": "Point", "coordinates": [-0.22, 51.49]}},
            {"type": "Feature", "properties": {"LAD21CD": "E09000023", "LAD21NM": "Lewisham", "AREA": null},
             "geometry": null}
        ]
    }"#;

    #[test]
    fn geometry_is_passed_through() {
        let vintage = Vintage::new("2021");
        let rename = BTreeMap::new();
        let schema = TableSchema {
            name: "lad-boundaries",
            vintage: &vintage,
            period: None,
            granularity: Granularity::Lad,
            code_column: "LAD21CD",
            value_columns: &[],
            rename: &rename,
        };
        let ds = read_geojson_dataset(LADS, &schema).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.column(GEOMETRY_COLUMN).unwrap().kind(), ColumnKind::Geometry);
        match ds.value(GEOMETRY_COLUMN, "E09000013") {
            Cell::Geometry(g) => assert!(g.as_str().contains("\"Point\"")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ds.value(GEOMETRY_COLUMN, "E09000023").is_null());
        assert_eq!(ds.numeric_value("AREA", "E09000013"), Some(16.4));
        assert_eq!(ds.value("LAD21NM", "E09000023"), Cell::Text("Lewisham"));
    }
}

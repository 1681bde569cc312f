use std::sync::Arc;

use crate::{
    common::{is_text_column, numeric_values, read_from_csv_bytes, string_values},
    error::Result,
};
use super::TableSchema;
use crate::dataset::{column::Column, dataset::Dataset};

/// Tabular payload: one row per unit. Text columns become categorical, the rest numeric.
pub(super) fn read_csv_dataset(bytes: &[u8], schema: &TableSchema<'_>) -> Result<Dataset> {
    let df = read_from_csv_bytes(bytes, &[schema.code_column])
        .map_err(|err| schema.invalid(format!("{err:#}")))?;

    let available: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    if !available.iter().any(|c| c == schema.code_column) {
        return Err(schema.invalid(format!(
            "code column {:?} not found (columns: {})", schema.code_column, available.join(", ")
        )));
    }

    let codes = string_values(&df, schema.code_column)
        .map_err(|err| schema.invalid(format!("{err:#}")))?;
    let codes: Vec<String> = codes.into_iter()
        .enumerate()
        .map(|(row, code)| code.ok_or_else(|| schema.invalid(format!("row {row} has no code"))))
        .collect::<Result<_>>()?;

    let selected: Vec<&str> = if schema.value_columns.is_empty() {
        available.iter().map(String::as_str).filter(|&c| c != schema.code_column).collect()
    } else {
        schema.value_columns.iter().map(String::as_str).collect()
    };

    let mut columns = Vec::with_capacity(selected.len());
    for name in selected {
        if !available.iter().any(|c| c == name) {
            return Err(schema.invalid(format!("value column {name:?} not found")));
        }
        let column = if is_text_column(&df, name) {
            let values = string_values(&df, name).map_err(|err| schema.invalid(format!("{err:#}")))?;
            Column::categorical(schema.output_name(name), values.into_iter().map(|v| v.map(Arc::from)).collect())
        } else {
            let values = numeric_values(&df, name).map_err(|err| schema.invalid(format!("{err:#}")))?;
            Column::numeric(schema.output_name(name), values)
        };
        columns.push(column);
    }

    Dataset::new(schema.name, schema.vintage.clone(), schema.granularity, codes, columns)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{area::{Granularity, Vintage}, dataset::column::Value, error::GeoError};

    fn schema<'a>(vintage: &'a Vintage, rename: &'a BTreeMap<String, String>, values: &'a [String]) -> TableSchema<'a> {
        TableSchema {
            name: "deprivation",
            vintage,
            period: None,
            granularity: Granularity::Lsoa,
            code_column: "lsoa21cd",
            value_columns: values,
            rename,
        }
    }

    #[test]
    fn reads_numeric_and_categorical_columns() {
        let vintage = Vintage::new("2021");
        let rename = BTreeMap::from([("imd_decile".to_string(), "decile".to_string())]);
        let bytes = b"lsoa21cd,imd_decile,band\nE01000001,3,low\nE01000002,,high\n";

        let ds = read_csv_dataset(bytes, &schema(&vintage, &rename, &[])).unwrap();
        assert_eq!(ds.column_names().collect::<Vec<_>>(), vec!["decile", "band"]);
        assert_eq!(ds.numeric_value("decile", "E01000001"), Some(3.0));
        assert!(ds.value("decile", "E01000002").is_null());
        assert_eq!(ds.value("band", "E01000002"), Value::Text("high"));
    }

    #[test]
    fn missing_columns_are_invalid() {
        let vintage = Vintage::new("2021");
        let rename = BTreeMap::new();
        let err = read_csv_dataset(b"code,n\nA,1\n", &schema(&vintage, &rename, &[])).unwrap_err();
        assert!(matches!(err, GeoError::InvalidDataset { .. }));

        let wanted = vec!["population".to_string()];
        let err = read_csv_dataset(b"lsoa21cd,n\nA,1\n", &schema(&vintage, &rename, &wanted)).unwrap_err();
        assert!(err.to_string().contains("population"));
    }
}

mod csv;
mod geojson;

use std::collections::BTreeMap;

use crate::{
    area::{Granularity, Vintage},
    error::{GeoError, Result},
};
use super::{dataset::Dataset, source::SourceFormat};

/// How to turn a raw payload into a [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableSchema<'a> {
    pub name: &'a str,
    pub vintage: &'a Vintage,
    pub period: Option<&'a str>,
    pub granularity: Granularity,
    pub code_column: &'a str,
    /// Columns to keep; all but the code column when empty.
    pub value_columns: &'a [String],
    pub rename: &'a BTreeMap<String, String>,
}

impl TableSchema<'_> {
    fn output_name<'n>(&'n self, column: &'n str) -> &'n str {
        self.rename.get(column).map(String::as_str).unwrap_or(column)
    }

    fn invalid(&self, reason: impl ToString) -> GeoError {
        GeoError::InvalidDataset { dataset: self.name.to_string(), reason: reason.to_string() }
    }

    fn finish(&self, dataset: Dataset) -> Dataset {
        match self.period {
            Some(period) => dataset.with_period(period),
            None => dataset,
        }
    }
}

/// Parse `bytes` in `format` into a dataset keyed by the schema's code column.
pub(crate) fn read_dataset(bytes: &[u8], format: SourceFormat, schema: &TableSchema<'_>) -> Result<Dataset> {
    let dataset = match format {
        SourceFormat::Csv => csv::read_csv_dataset(bytes, schema)?,
        SourceFormat::GeoJson => geojson::read_geojson_dataset(bytes, schema)?,
    };
    Ok(schema.finish(dataset))
}

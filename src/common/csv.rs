use std::{io::Cursor, sync::Arc};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::{SerReader, SerWriter}, prelude::{CsvReadOptions, CsvReader, CsvWriter, DataType, Field, Schema, SchemaRef}};

/// Read a DataFrame from CSV bytes.
/// `text_columns` are always read as strings so codes keep their leading zeros.
pub(crate) fn read_from_csv_bytes(bytes: &[u8], text_columns: &[&str]) -> Result<DataFrame> {
    let cursor = Cursor::new(bytes);

    let options = CsvReadOptions::default()
        .with_schema_overwrite(Some(text_schema(text_columns)));

    let df = CsvReader::new(cursor)
        .with_options(options)
        .finish()
        .context("Failed to parse CSV data")?;
    Ok(df)
}

/// Write a DataFrame to CSV bytes.
pub(crate) fn write_to_csv_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    CsvWriter::new(&mut out).finish(&mut df.clone())?;
    Ok(out)
}

fn text_schema(columns: &[&str]) -> SchemaRef {
    Arc::new(Schema::from_iter(
        columns.iter().map(|&name| Field::new(name.into(), DataType::String)),
    ))
}

/// Collect a column as optional strings, casting non-string columns first.
pub(crate) fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)
        .with_context(|| format!("missing column {name:?}"))?;
    let series = if column.dtype() != &DataType::String {
        column.as_materialized_series().cast(&DataType::String)?
    } else {
        column.as_materialized_series().clone()
    };
    let values = series.str()
        .with_context(|| format!("column {name:?} is not a string column"))?
        .into_iter()
        .map(|opt| opt.map(str::to_string))
        .collect();
    Ok(values)
}

/// Collect a column as optional floats. String columns must parse in full.
pub(crate) fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)
        .with_context(|| format!("missing column {name:?}"))?;
    let series = column.as_materialized_series();
    let series = if series.dtype() == &DataType::String {
        series.strict_cast(&DataType::Float64)
            .with_context(|| format!("column {name:?} is not numeric"))?
    } else {
        series.cast(&DataType::Float64)?
    };
    let values = series.f64()
        .with_context(|| format!("column {name:?} is not numeric"))?
        .into_iter()
        .collect();
    Ok(values)
}

/// True for columns polars parsed as text.
pub(crate) fn is_text_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).map(|c| c.dtype() == &DataType::String).unwrap_or(false)
}

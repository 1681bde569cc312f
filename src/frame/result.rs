use std::{path::Path, sync::Arc};

use anyhow::Context;
use polars::{frame::DataFrame, prelude::{Column as FrameColumn, NamedFrom}, series::Series};

use crate::{
    area::{Granularity, Vintage},
    common::{write_atomic, write_to_csv_bytes},
    dataset::{Column, ColumnData, Dataset, Value, CODE_COLUMN, GRANULARITY_COLUMN},
};
use super::provenance::Provenance;

/// Output of a join: a table keyed by code plus its provenance. There is no mutation API.
#[derive(Debug, Clone)]
pub struct ResultFrame {
    table: Dataset,
    provenance: Provenance,
}

/// Borrowed view of one output row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    frame: &'a ResultFrame,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn code(&self) -> &'a str {
        &self.frame.table.codes()[self.index]
    }

    pub fn get(&self, column: &str) -> Value<'a> {
        self.frame.table.column(column).map_or(Value::Null, |c| c.get(self.index))
    }

    /// `(column, value)` pairs in column order.
    pub fn values(&self) -> impl Iterator<Item = (&'a str, Value<'a>)> + 'a {
        let index = self.index;
        self.frame.table.columns().iter().map(move |c| (c.name(), c.get(index)))
    }
}

impl ResultFrame {
    pub(crate) fn new(table: Dataset, provenance: Provenance) -> Self {
        Self { table, provenance }
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// The underlying table; codes sorted ascending.
    pub fn table(&self) -> &Dataset {
        &self.table
    }

    pub fn granularity(&self) -> Granularity {
        self.table.granularity()
    }

    pub fn vintage(&self) -> &Vintage {
        self.table.vintage()
    }

    pub fn codes(&self) -> &[Arc<str>] {
        self.table.codes()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.table.column_names()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.table.column(name)
    }

    pub fn value(&self, column: &str, code: &str) -> Value<'_> {
        self.table.value(column, code)
    }

    pub fn numeric_value(&self, column: &str, code: &str) -> Option<f64> {
        self.table.numeric_value(column, code)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn row(&self, code: &str) -> Option<Row<'_>> {
        self.table.row(code).map(|index| Row { frame: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len()).map(move |index| Row { frame: self, index })
    }

    /// Export as a polars DataFrame: `code`, `granularity`, then the metric columns.
    /// Geometry references are exported as their text.
    pub fn to_dataframe(&self) -> anyhow::Result<DataFrame> {
        let codes: Vec<&str> = self.codes().iter().map(|c| &**c).collect();
        let granularity = vec![self.granularity().to_str(); codes.len()];

        let mut columns: Vec<FrameColumn> = vec![
            Series::new(CODE_COLUMN.into(), codes).into(),
            Series::new(GRANULARITY_COLUMN.into(), granularity).into(),
        ];
        for column in self.table.columns() {
            let series = match column.data() {
                ColumnData::Numeric(values) => Series::new(column.name().into(), values),
                ColumnData::Categorical(values) => Series::new(
                    column.name().into(),
                    values.iter().map(|v| v.as_deref()).collect::<Vec<_>>(),
                ),
                ColumnData::Geometry(values) => Series::new(
                    column.name().into(),
                    values.iter().map(|v| v.as_ref().map(|g| g.as_str())).collect::<Vec<_>>(),
                ),
            };
            columns.push(series.into());
        }
        DataFrame::new(columns).context("Failed to build result DataFrame")
    }

    pub fn to_csv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        write_to_csv_bytes(&self.to_dataframe()?)
    }

    /// Write the CSV export to `path`, replacing any existing file atomically.
    pub fn write_csv(&self, path: &Path) -> anyhow::Result<()> {
        write_atomic(path, &self.to_csv_bytes()?)
    }
}

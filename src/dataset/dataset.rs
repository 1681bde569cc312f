use std::{collections::HashSet, sync::Arc};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    area::{canonical_code, Granularity, Vintage},
    error::{GeoError, Result},
};
use super::column::{Column, Value};

/// Code of the key column in exported tables; never a value column name.
pub const CODE_COLUMN: &str = "code";

/// Column carrying the granularity label in exported tables; also reserved.
pub const GRANULARITY_COLUMN: &str = "granularity";

/// A named, versioned table keyed by canonical areal-unit code at one granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DatasetParts", into = "DatasetParts")]
pub struct Dataset {
    name: Arc<str>,
    vintage: Vintage,
    period: Option<Arc<str>>,
    granularity: Granularity,
    codes: Vec<Arc<str>>,
    columns: Vec<Column>,
    index: AHashMap<Arc<str>, u32>, // Map between codes and row positions.
}

/// Serialized form; the row index is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct DatasetParts {
    name: Arc<str>,
    vintage: Vintage,
    #[serde(default)]
    period: Option<Arc<str>>,
    granularity: Granularity,
    codes: Vec<Arc<str>>,
    columns: Vec<Column>,
}

impl TryFrom<DatasetParts> for Dataset {
    type Error = GeoError;

    fn try_from(parts: DatasetParts) -> Result<Self> {
        let dataset = Dataset::new(&*parts.name, parts.vintage, parts.granularity, parts.codes, parts.columns)?;
        Ok(match parts.period {
            Some(period) => dataset.with_period(&*period),
            None => dataset,
        })
    }
}

impl From<Dataset> for DatasetParts {
    fn from(dataset: Dataset) -> Self {
        Self {
            name: dataset.name,
            vintage: dataset.vintage,
            period: dataset.period,
            granularity: dataset.granularity,
            codes: dataset.codes,
            columns: dataset.columns,
        }
    }
}

impl Dataset {
    /// Build a dataset, canonicalising codes and checking that codes are unique,
    /// column names are unique and every column has one value per code.
    pub fn new<S: AsRef<str>>(
        name: &str,
        vintage: Vintage,
        granularity: Granularity,
        codes: impl IntoIterator<Item = S>,
        columns: Vec<Column>,
    ) -> Result<Self> {
        let invalid = |reason: String| GeoError::InvalidDataset { dataset: name.to_string(), reason };

        let codes: Vec<Arc<str>> = codes.into_iter()
            .map(|code| Arc::from(canonical_code(granularity, code.as_ref())))
            .collect();

        let mut index = AHashMap::with_capacity(codes.len());
        for (i, code) in codes.iter().enumerate() {
            if code.is_empty() {
                return Err(invalid(format!("row {i} has an empty code")));
            }
            if index.insert(code.clone(), i as u32).is_some() {
                return Err(invalid(format!("duplicate {granularity} code {code:?}")));
            }
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.name() == CODE_COLUMN || column.name() == GRANULARITY_COLUMN {
                return Err(invalid(format!("{:?} is reserved for exported tables", column.name())));
            }
            if !seen.insert(column.name()) {
                return Err(invalid(format!("duplicate column {:?}", column.name())));
            }
            if column.len() != codes.len() {
                return Err(invalid(format!(
                    "column {:?} has {} values for {} codes", column.name(), column.len(), codes.len()
                )));
            }
        }

        Ok(Self {
            name: Arc::from(name),
            vintage,
            period: None,
            granularity,
            codes,
            columns,
            index,
        })
    }

    /// One numeric column from `(code, value)` pairs.
    pub fn numeric<S: AsRef<str>>(
        name: &str,
        vintage: Vintage,
        granularity: Granularity,
        column: &str,
        rows: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Self> {
        let (codes, values): (Vec<S>, Vec<Option<f64>>) = rows.into_iter()
            .map(|(code, value)| (code, Some(value)))
            .unzip();
        Self::new(name, vintage, granularity, codes, vec![Column::numeric(column, values)])
    }

    pub fn with_period(mut self, period: &str) -> Self {
        self.period = Some(Arc::from(period));
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn vintage(&self) -> &Vintage { &self.vintage }

    pub fn period(&self) -> Option<&str> { self.period.as_deref() }

    pub fn granularity(&self) -> Granularity { self.granularity }

    pub fn codes(&self) -> &[Arc<str>] { &self.codes }

    pub fn columns(&self) -> &[Column] { &self.columns }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn len(&self) -> usize { self.codes.len() }

    pub fn is_empty(&self) -> bool { self.codes.is_empty() }

    /// Row position of `code`, which is canonicalised at this dataset's granularity first.
    pub fn row(&self, code: &str) -> Option<usize> {
        self.index.get(code)
            .or_else(|| self.index.get(canonical_code(self.granularity, code).as_str()))
            .map(|&i| i as usize)
    }

    pub fn value(&self, column: &str, code: &str) -> Value<'_> {
        match (self.column(column), self.row(code)) {
            (Some(column), Some(row)) => column.get(row),
            _ => Value::Null,
        }
    }

    pub fn numeric_value(&self, column: &str, code: &str) -> Option<f64> {
        self.value(column, code).as_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vintage() -> Vintage { Vintage::new("2021") }

    #[test]
    fn rejects_duplicate_codes() {
        let err = Dataset::numeric("clients", vintage(), Granularity::Lsoa, "clients",
            [("LSOA001", 1.0), ("LSOA001", 2.0)]).unwrap_err();
        assert!(matches!(err, GeoError::InvalidDataset { .. }));
    }

    #[test]
    fn postcode_codes_are_canonicalised() {
        let ds = Dataset::numeric("clients", vintage(), Granularity::Postcode, "clients",
            [("se135ab", 2.0)]).unwrap();
        assert_eq!(&*ds.codes()[0], "SE13 5AB");
        assert_eq!(ds.numeric_value("clients", "se13 5ab"), Some(2.0));
    }

    #[test]
    fn rejects_ragged_and_reserved_columns() {
        let ragged = Dataset::new("x", vintage(), Granularity::Lad, ["A", "B"],
            vec![Column::numeric("n", vec![Some(1.0)])]);
        assert!(ragged.is_err());

        let reserved = Dataset::new("x", vintage(), Granularity::Lad, ["A"],
            vec![Column::numeric(CODE_COLUMN, vec![Some(1.0)])]);
        assert!(reserved.is_err());

        let label = Dataset::new("x", vintage(), Granularity::Lad, ["A"],
            vec![Column::categorical(GRANULARITY_COLUMN, vec![Some(Arc::from("lad"))])]);
        assert!(matches!(label, Err(GeoError::InvalidDataset { .. })));
    }

    #[test]
    fn serde_rebuilds_the_index() {
        let ds = Dataset::numeric("pop", vintage(), Granularity::Lsoa, "population",
            [("LSOA001", 1500.0)]).unwrap().with_period("mid-2021");
        let json = serde_json::to_string(&ds).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back.numeric_value("population", "LSOA001"), Some(1500.0));
        assert_eq!(back.period(), Some("mid-2021"));
    }
}

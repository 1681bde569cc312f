use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque reference to a boundary geometry (e.g. serialized GeoJSON or a feature URI).
/// The engine never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryRef(Arc<str>);

impl GeometryRef {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Geometry,
}

/// Column storage, one variant per value schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<Arc<str>>>),
    Geometry(Vec<Option<GeometryRef>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
            ColumnData::Geometry(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
            ColumnData::Geometry(_) => ColumnKind::Geometry,
        }
    }

    /// Gather rows by position; `None` positions become nulls.
    pub(crate) fn take(&self, positions: &[Option<usize>]) -> ColumnData {
        fn gather<T: Clone>(values: &[Option<T>], positions: &[Option<usize>]) -> Vec<Option<T>> {
            positions.iter()
                .map(|pos| pos.and_then(|i| values[i].clone()))
                .collect()
        }

        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(gather(v, positions)),
            ColumnData::Categorical(v) => ColumnData::Categorical(gather(v, positions)),
            ColumnData::Geometry(v) => ColumnData::Geometry(gather(v, positions)),
        }
    }
}

/// A single cell, borrowed from its column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Null,
    Number(f64),
    Text(&'a str),
    Geometry(&'a GeometryRef),
}

impl Value<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A named value column of a [`Dataset`](super::Dataset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: Arc<str>,
    data: ColumnData,
}

impl Column {
    pub fn new(name: impl AsRef<str>, data: ColumnData) -> Self {
        Self { name: Arc::from(name.as_ref()), data }
    }

    pub fn numeric(name: impl AsRef<str>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Numeric(values))
    }

    pub fn categorical(name: impl AsRef<str>, values: Vec<Option<Arc<str>>>) -> Self {
        Self::new(name, ColumnData::Categorical(values))
    }

    pub fn geometry(name: impl AsRef<str>, values: Vec<Option<GeometryRef>>) -> Self {
        Self::new(name, ColumnData::Geometry(values))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, row: usize) -> Value<'_> {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Number),
            ColumnData::Categorical(v) => v.get(row).and_then(Option::as_deref).map_or(Value::Null, Value::Text),
            ColumnData::Geometry(v) => v.get(row).and_then(Option::as_ref).map_or(Value::Null, Value::Geometry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_fills_gaps_with_nulls() {
        let col = Column::numeric("clients", vec![Some(1.0), None, Some(3.0)]);
        let taken = col.data().take(&[Some(2), None, Some(0), Some(1)]);
        assert_eq!(taken, ColumnData::Numeric(vec![Some(3.0), None, Some(1.0), None]));
    }

    #[test]
    fn cells_are_typed() {
        let col = Column::categorical("region", vec![Some(Arc::from("London")), None]);
        assert_eq!(col.get(0), Value::Text("London"));
        assert!(col.get(1).is_null());
        assert!(col.get(7).is_null());
    }
}

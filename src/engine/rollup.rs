use std::{borrow::Cow, collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    area::Granularity,
    catalogue::CatalogueVintage,
    dataset::{Column, ColumnData, Dataset},
    error::{GeoError, Result},
};
use super::spec::{Aggregation, JoinSpec};

/// Group a finer dataset by each row's ancestor at `spec.granularity`.
/// Datasets already at the target are borrowed as they are.
pub(crate) fn roll_up<'d>(
    dataset: &'d Dataset,
    spec: &JoinSpec,
    edition: impl FnOnce() -> Result<&'d CatalogueVintage>,
) -> Result<Cow<'d, Dataset>> {
    let target = spec.granularity;
    if dataset.granularity() == target {
        return Ok(Cow::Borrowed(dataset));
    }
    if !dataset.granularity().nests_in(target) {
        return Err(GeoError::GranularityMismatch {
            dataset: dataset.name().to_string(),
            found: dataset.granularity(),
            expected: target,
        });
    }

    let edition = edition()?;
    let mut groups: BTreeMap<Arc<str>, Vec<usize>> = BTreeMap::new();
    for (row, code) in dataset.codes().iter().enumerate() {
        let parent = edition.unit(dataset.granularity(), code)
            .and_then(|unit| unit.parents.get(target))
            .ok_or_else(|| GeoError::NotFound {
                identifier: code.to_string(),
                granularity: target,
                vintage: edition.vintage().clone(),
            })?;
        groups.entry(parent.clone()).or_default().push(row);
    }

    let columns = dataset.columns().iter()
        .map(|column| aggregate_column(column, &groups, spec.aggregation_for(column.name())))
        .collect();

    debug!(dataset = dataset.name(), from = %dataset.granularity(), to = %target,
        rows = dataset.len(), groups = groups.len(), "rolled up");

    let rolled = Dataset::new(dataset.name(), dataset.vintage().clone(), target, groups.keys(), columns)?;
    Ok(Cow::Owned(match dataset.period() {
        Some(period) => rolled.with_period(period),
        None => rolled,
    }))
}

/// Numeric cells combine by `aggregation` over non-null members (all-null stays null).
/// Categorical and geometry cells survive only when every non-null member agrees.
fn aggregate_column(column: &Column, groups: &BTreeMap<Arc<str>, Vec<usize>>, aggregation: Aggregation) -> Column {
    fn agree<T: Clone + PartialEq>(values: &[Option<T>], rows: &[usize]) -> Option<T> {
        let mut present = rows.iter().filter_map(|&i| values[i].as_ref());
        let first = present.next()?;
        present.all(|v| v == first).then(|| first.clone())
    }

    let data = match column.data() {
        ColumnData::Numeric(values) => ColumnData::Numeric(groups.values()
            .map(|rows| {
                let present: Vec<f64> = rows.iter().filter_map(|&i| values[i]).collect();
                if present.is_empty() {
                    return None;
                }
                let sum: f64 = present.iter().sum();
                Some(match aggregation {
                    Aggregation::Sum => sum,
                    Aggregation::Mean => sum / present.len() as f64,
                })
            })
            .collect()),
        ColumnData::Categorical(values) => ColumnData::Categorical(groups.values().map(|rows| agree(values, rows)).collect()),
        ColumnData::Geometry(values) => ColumnData::Geometry(groups.values().map(|rows| agree(values, rows)).collect()),
    };
    Column::new(column.name(), data)
}

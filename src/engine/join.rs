use std::{borrow::Cow, collections::{BTreeMap, BTreeSet}, sync::Arc};

use tracing::{info, warn};

use crate::{
    catalogue::{Catalogue, CatalogueVintage},
    dataset::{Column, ColumnKind, Dataset},
    error::{GeoError, Result},
    frame::{Provenance, ResultFrame, SourceInfo},
};
use super::{
    rate::{per_capita, JoinWarning},
    rollup::roll_up,
    spec::{Denominator, JoinSpec},
};

/// Output column holding catalogue populations when they are the denominator.
pub const POPULATION_COLUMN: &str = "population";

/// Merges datasets on canonical code at one granularity and computes rates.
#[derive(Debug, Clone, Copy)]
pub struct JoinEngine<'c> {
    catalogue: &'c Catalogue,
}

impl<'c> JoinEngine<'c> {
    pub fn new(catalogue: &'c Catalogue) -> Self {
        Self { catalogue }
    }

    fn edition(&self, spec: &JoinSpec) -> Result<&'c CatalogueVintage> {
        self.catalogue.vintage(&spec.vintage)
    }

    /// Outer-join `datasets` at `spec.granularity`, rolling finer ones up through the catalogue.
    /// Fails as a whole: no partial frame is returned.
    pub fn join(&self, datasets: &[&Dataset], spec: &JoinSpec) -> Result<ResultFrame> {
        if datasets.is_empty() {
            return Err(GeoError::Config("a join needs at least one dataset".into()));
        }
        for dataset in datasets {
            if dataset.vintage() != &spec.vintage {
                return Err(GeoError::VintageMismatch {
                    context: format!("dataset {:?}", dataset.name()),
                    expected: spec.vintage.clone(),
                    found: dataset.vintage().clone(),
                });
            }
        }

        let rolled: Vec<Cow<'_, Dataset>> = datasets.iter()
            .map(|&dataset| roll_up(dataset, spec, || self.edition(spec)))
            .collect::<Result<_>>()?;

        // Every output column must come from exactly one dataset.
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for dataset in &rolled {
            for column in dataset.column_names() {
                if let Some(first) = owners.insert(column, dataset.name()) {
                    return Err(GeoError::ColumnCollision {
                        column: column.to_string(),
                        first: first.to_string(),
                        second: dataset.name().to_string(),
                    });
                }
            }
        }

        let codes: Vec<Arc<str>> = rolled.iter()
            .flat_map(|dataset| dataset.codes().iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut columns = Vec::new();
        let mut sources = Vec::with_capacity(rolled.len());
        for (original, dataset) in datasets.iter().zip(&rolled) {
            let positions: Vec<Option<usize>> = codes.iter().map(|code| dataset.row(code)).collect();
            for column in dataset.columns() {
                columns.push(Column::new(column.name(), column.data().take(&positions)));
            }
            sources.push(SourceInfo {
                name: original.name().to_string(),
                vintage: original.vintage().clone(),
                period: original.period().map(str::to_string),
                granularity: original.granularity(),
                rows: original.len(),
                missing_codes: codes.len() - dataset.len(),
            });
        }

        let mut warnings = Vec::new();
        if let Some(denominator) = &spec.denominator {
            let (denominator_column, values) = self.denominator_values(denominator, &codes, &columns, spec, &mut owners)?;
            if let Some(column) = denominator_column {
                columns.push(column);
            }
            let rates = self.rates(&columns, &values, spec, denominator, &owners)?;

            for (code, value) in codes.iter().zip(&values) {
                warnings.extend(JoinWarning::check(code, *value));
            }
            columns.extend(rates);
            if !warnings.is_empty() {
                warn!(count = warnings.len(), "rates are null where the denominator is zero or missing");
            }
        }

        let name = rolled.iter().map(|d| d.name()).collect::<Vec<_>>().join("+");
        let table = Dataset::new(&name, spec.vintage.clone(), spec.granularity, codes, columns)?;
        info!(rows = table.len(), columns = table.columns().len(), granularity = %spec.granularity, "joined");

        Ok(ResultFrame::new(table, Provenance {
            sources,
            granularity: spec.granularity,
            vintage: spec.vintage.clone(),
            denominator: spec.denominator.clone(),
            rate_scale: spec.rate_scale,
            warnings,
        }))
    }

    /// Denominator cell per output code, plus the column to add when it is not already there.
    fn denominator_values(
        &self,
        denominator: &Denominator,
        codes: &[Arc<str>],
        columns: &[Column],
        spec: &JoinSpec,
        owners: &mut BTreeMap<&str, &str>,
    ) -> Result<(Option<Column>, Vec<Option<f64>>)> {
        match denominator {
            Denominator::Column { dataset, column } => {
                match owners.get(column.as_str()) {
                    Some(owner) if *owner == dataset.as_str() => {}
                    Some(owner) => return Err(GeoError::Config(format!(
                        "denominator column {column:?} belongs to {owner:?}, not {dataset:?}"
                    ))),
                    None => return Err(GeoError::Config(format!(
                        "denominator {dataset:?}.{column:?} is not part of the join"
                    ))),
                }
                let values = columns.iter()
                    .find(|c| c.name() == column)
                    .and_then(Column::as_numeric)
                    .ok_or_else(|| GeoError::InvalidDataset {
                        dataset: dataset.clone(),
                        reason: format!("denominator column {column:?} is not numeric"),
                    })?;
                Ok((None, values.to_vec()))
            }
            Denominator::Population => {
                if let Some(owner) = owners.insert(POPULATION_COLUMN, "catalogue") {
                    return Err(GeoError::ColumnCollision {
                        column: POPULATION_COLUMN.into(),
                        first: owner.to_string(),
                        second: "catalogue".into(),
                    });
                }
                let edition = self.edition(spec)?;
                let values: Vec<Option<f64>> = codes.iter()
                    .map(|code| edition.population(spec.granularity, code).map(|p| p as f64))
                    .collect();
                Ok((Some(Column::numeric(POPULATION_COLUMN, values.clone())), values))
            }
        }
    }

    fn rates(
        &self,
        columns: &[Column],
        denominators: &[Option<f64>],
        spec: &JoinSpec,
        denominator: &Denominator,
        owners: &BTreeMap<&str, &str>,
    ) -> Result<Vec<Column>> {
        let denominator_name = match denominator {
            Denominator::Column { column, .. } => column.as_str(),
            Denominator::Population => POPULATION_COLUMN,
        };

        // Repeated names ask for the same rate once.
        let mut requested = BTreeSet::new();
        let selected: Vec<&Column> = match &spec.rate_columns {
            Some(names) => names.iter()
                .filter(|name| requested.insert(name.as_str()))
                .map(|name| columns.iter()
                    .find(|c| c.name() == name && c.kind() == ColumnKind::Numeric)
                    .ok_or_else(|| GeoError::Config(format!("rate column {name:?} is not a numeric column of the join"))))
                .collect::<Result<_>>()?,
            None => columns.iter()
                .filter(|c| c.kind() == ColumnKind::Numeric && c.name() != denominator_name)
                .collect(),
        };

        let mut rates = Vec::with_capacity(selected.len());
        for column in selected {
            let name = spec.rate_column_name(column.name());
            if let Some(owner) = owners.get(name.as_str()) {
                return Err(GeoError::ColumnCollision {
                    column: name,
                    first: owner.to_string(),
                    second: "rates".into(),
                });
            }
            let values = column.as_numeric().unwrap_or_default();
            let rate: Vec<Option<f64>> = values.iter()
                .zip(denominators)
                .map(|(&value, &denominator)| per_capita(value, denominator).map(|r| r * spec.rate_scale))
                .collect();
            rates.push(Column::numeric(name, rate));
        }
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        area::{AreaUnit, Granularity, Vintage},
        catalogue::CatalogueBuilder,
    };

    fn v2021() -> Vintage { Vintage::new("2021") }

    fn catalogue() -> Catalogue {
        Catalogue::new().with_vintage(CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000023").with_population(300_000))
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000013"))
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01003189").with_parent(Granularity::Lad, "E09000023"))
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01003190").with_parent(Granularity::Lad, "E09000023"))
            .build()
            .unwrap())
    }

    #[test]
    fn rolls_up_and_uses_catalogue_population() {
        let catalogue = catalogue();
        let clients = Dataset::numeric("clients", v2021(), Granularity::Lsoa, "clients",
            [("E01003189", 100.0), ("E01003190", 200.0)]).unwrap();
        let other = Dataset::numeric("other", v2021(), Granularity::Lad, "other", [("E09000013", 5.0)]).unwrap();

        let spec = JoinSpec::new(Granularity::Lad, v2021())
            .with_population_denominator()
            .with_rate_scale(1000.0);
        let frame = JoinEngine::new(&catalogue).join(&[&clients, &other], &spec).unwrap();

        assert_eq!(frame.codes().iter().map(|c| &**c).collect::<Vec<_>>(), ["E09000013", "E09000023"]);
        assert_eq!(frame.numeric_value("clients", "E09000023"), Some(300.0));
        assert_eq!(frame.numeric_value("population", "E09000023"), Some(300_000.0));
        assert_eq!(frame.numeric_value("clients_rate", "E09000023"), Some(1.0));
        assert!(frame.value("clients_rate", "E09000013").is_null());
        assert_eq!(frame.provenance().warnings, vec![JoinWarning::MissingDenominator { code: "E09000013".into() }]);
        assert_eq!(frame.provenance().sources[0].granularity, Granularity::Lsoa);
    }

    #[test]
    fn denominator_must_belong_to_the_named_dataset() {
        let catalogue = catalogue();
        let clients = Dataset::numeric("clients", v2021(), Granularity::Lad, "clients", [("E09000023", 1.0)]).unwrap();
        let spec = JoinSpec::new(Granularity::Lad, v2021()).with_denominator_column("pop", "population");
        let err = JoinEngine::new(&catalogue).join(&[&clients], &spec).unwrap_err();
        assert!(matches!(err, GeoError::Config(_)));
    }

    #[test]
    fn repeated_rate_columns_yield_one_rate() {
        let catalogue = catalogue();
        let clients = Dataset::numeric("clients", v2021(), Granularity::Lad, "clients", [("E09000023", 600.0)]).unwrap();
        let spec = JoinSpec::new(Granularity::Lad, v2021())
            .with_population_denominator()
            .with_rate_columns(["clients", "clients"]);
        let frame = JoinEngine::new(&catalogue).join(&[&clients], &spec).unwrap();

        assert_eq!(frame.column_names().filter(|&name| name == "clients_rate").count(), 1);
        assert_eq!(frame.numeric_value("clients_rate", "E09000023"), Some(600.0 / 300_000.0));
    }
}

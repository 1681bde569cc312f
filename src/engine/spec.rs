use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::area::{Granularity, Vintage};

/// How finer rows combine when rolled up to a coarser unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
}

/// What rates are divided by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Denominator {
    /// A numeric column of one of the joined datasets.
    Column { dataset: String, column: String },
    /// Unit populations recorded in the catalogue, added to the output as `population`.
    Population,
}

/// Target of a join: granularity, vintage, and how to aggregate and normalise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSpec {
    pub granularity: Granularity,
    pub vintage: Vintage,
    pub denominator: Option<Denominator>,
    pub aggregation: Aggregation,
    /// Per-column overrides of `aggregation`.
    pub column_aggregation: BTreeMap<String, Aggregation>,
    /// Columns to compute rates for; every numeric non-denominator column when `None`.
    pub rate_columns: Option<Vec<String>>,
    /// Rates are multiplied by this, e.g. 1000 for "per thousand".
    pub rate_scale: f64,
    pub rate_suffix: String,
}

impl Default for JoinSpec {
    fn default() -> Self {
        Self::new(Granularity::Lsoa, Vintage::new("2021"))
    }
}

impl JoinSpec {
    pub fn new(granularity: Granularity, vintage: Vintage) -> Self {
        Self {
            granularity,
            vintage,
            denominator: None,
            aggregation: Aggregation::Sum,
            column_aggregation: BTreeMap::new(),
            rate_columns: None,
            rate_scale: 1.0,
            rate_suffix: "_rate".into(),
        }
    }

    pub fn with_denominator_column(mut self, dataset: &str, column: &str) -> Self {
        self.denominator = Some(Denominator::Column { dataset: dataset.into(), column: column.into() });
        self
    }

    pub fn with_population_denominator(mut self) -> Self {
        self.denominator = Some(Denominator::Population);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_column_aggregation(mut self, column: &str, aggregation: Aggregation) -> Self {
        self.column_aggregation.insert(column.into(), aggregation);
        self
    }

    pub fn with_rate_columns<S: ToString>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.rate_columns = Some(columns.into_iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_rate_scale(mut self, scale: f64) -> Self {
        self.rate_scale = scale;
        self
    }

    pub fn aggregation_for(&self, column: &str) -> Aggregation {
        self.column_aggregation.get(column).copied().unwrap_or(self.aggregation)
    }

    pub fn rate_column_name(&self, column: &str) -> String {
        format!("{column}{}", self.rate_suffix)
    }
}

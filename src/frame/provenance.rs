use serde::Serialize;

use crate::{
    area::{Granularity, Vintage},
    engine::{Denominator, JoinWarning},
};

/// One input of a join and how well it covers the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub vintage: Vintage,
    pub period: Option<String>,
    /// Granularity the dataset was loaded at, before any roll-up.
    pub granularity: Granularity,
    /// Rows as loaded.
    pub rows: usize,
    /// Output codes this source had no row for.
    pub missing_codes: usize,
}

/// Where a result came from and what went wrong on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub sources: Vec<SourceInfo>,
    pub granularity: Granularity,
    pub vintage: Vintage,
    pub denominator: Option<Denominator>,
    pub rate_scale: f64,
    pub warnings: Vec<JoinWarning>,
}

impl Provenance {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Share of output rows each source covers, by source name.
    pub fn coverage(&self, rows: usize) -> Vec<(&str, f64)> {
        self.sources.iter()
            .map(|s| {
                let covered = rows.saturating_sub(s.missing_codes);
                let share = if rows == 0 { 0.0 } else { covered as f64 / rows as f64 };
                (s.name.as_str(), share)
            })
            .collect()
    }
}

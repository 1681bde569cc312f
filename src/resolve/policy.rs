use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};

/// Result of resolving one identifier: exactly one canonical code, or why not.
pub type ResolutionResult = Result<Arc<str>>;

/// What a batch does with identifiers that fail to resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnUnresolved {
    /// The first failure fails the whole batch.
    #[default]
    Fail,
    /// Failed positions are dropped.
    Skip,
    /// Failed positions are kept as `None`.
    Null,
}

impl fmt::Display for OnUnresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OnUnresolved::Fail => "fail",
            OnUnresolved::Skip => "skip",
            OnUnresolved::Null => "null",
        })
    }
}

impl FromStr for OnUnresolved {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(OnUnresolved::Fail),
            "skip" => Ok(OnUnresolved::Skip),
            "null" => Ok(OnUnresolved::Null),
            other => Err(GeoError::Config(format!("unknown on_unresolved policy {other:?}, expected fail, skip or null"))),
        }
    }
}

/// Resolved/total counts of one batch, with failures tallied by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub resolved: usize,
    pub failures: BTreeMap<&'static str, usize>,
}

impl BatchReport {
    pub fn from_results(results: &[ResolutionResult]) -> Self {
        let mut report = BatchReport { total: results.len(), ..Default::default() };
        for result in results {
            match result {
                Ok(_) => report.resolved += 1,
                Err(err) => *report.failures.entry(err.kind()).or_default() += 1,
            }
        }
        report
    }

    pub fn unresolved(&self) -> usize {
        self.total - self.resolved
    }

    /// Share of identifiers that resolved, in `0.0..=1.0`; `None` for an empty batch.
    pub fn response_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.resolved as f64 / self.total as f64)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} resolved", self.resolved, self.total)?;
        if let Some(rate) = self.response_rate() {
            write!(f, " ({:.0}% response rate)", rate * 100.0)?;
        }
        for (kind, count) in &self.failures {
            write!(f, ", {count} {kind}")?;
        }
        Ok(())
    }
}

/// Apply `policy` to per-position results. `Fail` returns the first error; `Skip` keeps
/// only resolved positions; `Null` keeps every position.
pub fn apply_policy(results: Vec<ResolutionResult>, policy: OnUnresolved) -> Result<Vec<Option<Arc<str>>>> {
    match policy {
        OnUnresolved::Fail => results.into_iter().map(|r| r.map(Some)).collect(),
        OnUnresolved::Skip => Ok(results.into_iter().filter_map(|r| r.ok().map(Some)).collect()),
        OnUnresolved::Null => Ok(results.into_iter().map(|r| r.ok()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{Granularity, Vintage};

    fn results() -> Vec<ResolutionResult> {
        vec![
            Ok(Arc::from("E01000001")),
            Err(GeoError::NotFound { identifier: "ZZ1 1ZZ".into(), granularity: Granularity::Lsoa, vintage: Vintage::new("2021") }),
            Ok(Arc::from("E01000002")),
        ]
    }

    #[test]
    fn policies() {
        assert!(apply_policy(results(), OnUnresolved::Fail).is_err());
        assert_eq!(apply_policy(results(), OnUnresolved::Skip).unwrap().len(), 2);
        let nulls = apply_policy(results(), OnUnresolved::Null).unwrap();
        assert_eq!(nulls.len(), 3);
        assert!(nulls[1].is_none());
    }

    #[test]
    fn report_counts_failures_by_kind() {
        let report = BatchReport::from_results(&results());
        assert_eq!((report.total, report.resolved, report.unresolved()), (3, 2, 1));
        assert_eq!(report.failures.get("not_found"), Some(&1));
        assert_eq!(report.to_string(), "2/3 resolved (67% response rate), 1 not_found");
        assert_eq!("Skip".parse::<OnUnresolved>().unwrap(), OnUnresolved::Skip);
    }
}

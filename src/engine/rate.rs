use std::fmt;

use serde::Serialize;

/// `value / denominator`, or `None` when either side is missing or the denominator is not positive.
pub fn per_capita(value: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (value, denominator) {
        (Some(value), Some(denominator)) if denominator > 0.0 => Some(value / denominator),
        _ => None,
    }
}

/// A per-unit problem found while normalising; the affected rates are null.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinWarning {
    MissingDenominator { code: String },
    ZeroDenominator { code: String },
}

impl JoinWarning {
    /// Classify a denominator cell; `None` when it is usable.
    pub(crate) fn check(code: &str, denominator: Option<f64>) -> Option<Self> {
        match denominator {
            None => Some(JoinWarning::MissingDenominator { code: code.to_string() }),
            Some(d) if d <= 0.0 || d.is_nan() => Some(JoinWarning::ZeroDenominator { code: code.to_string() }),
            Some(_) => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            JoinWarning::MissingDenominator { code } | JoinWarning::ZeroDenominator { code } => code,
        }
    }
}

impl fmt::Display for JoinWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinWarning::MissingDenominator { code } => write!(f, "{code}: no denominator, rate is null"),
            JoinWarning::ZeroDenominator { code } => write!(f, "{code}: zero denominator, rate is null"),
        }
    }
}

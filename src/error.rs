use std::time::Duration;

use thiserror::Error;

use crate::area::{Granularity, Vintage};

pub type Result<T> = std::result::Result<T, GeoError>;

/// Every failure the engine reports to its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("{identifier:?} has no {granularity} mapping in the {vintage} catalogue")]
    NotFound {
        identifier: String,
        granularity: Granularity,
        vintage: Vintage,
    },

    #[error("{identifier:?} is ambiguous, candidates: {}", .candidates.join(", "))]
    AmbiguousIdentifier {
        identifier: String,
        candidates: Vec<String>,
    },

    #[error("cannot resolve {identifier:?} from {from} to {to}")]
    GranularityUnsupported {
        identifier: String,
        from: Granularity,
        to: Granularity,
    },

    #[error("dataset {dataset:?} is at {found} and cannot be joined at {expected}")]
    GranularityMismatch {
        dataset: String,
        found: Granularity,
        expected: Granularity,
    },

    #[error("source unavailable ({spec}): {reason}")]
    SourceUnavailable { spec: String, reason: String },

    #[error("column {column:?} is defined by both {first:?} and {second:?}")]
    ColumnCollision {
        column: String,
        first: String,
        second: String,
    },

    #[error("{context}: expected vintage {expected}, found {found}")]
    VintageMismatch {
        context: String,
        expected: Vintage,
        found: Vintage,
    },

    #[error("fetching {spec} did not complete within {timeout:?}")]
    Timeout { spec: String, timeout: Duration },

    #[error("invalid {vintage} catalogue: {reason}")]
    InvalidCatalogue { vintage: Vintage, reason: String },

    #[error("invalid dataset {dataset:?}: {reason}")]
    InvalidDataset { dataset: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl GeoError {
    /// Short stable name of the failure class, used when tallying batch failures.
    pub fn kind(&self) -> &'static str {
        match self {
            GeoError::NotFound { .. } => "not_found",
            GeoError::AmbiguousIdentifier { .. } => "ambiguous_identifier",
            GeoError::GranularityUnsupported { .. } => "granularity_unsupported",
            GeoError::GranularityMismatch { .. } => "granularity_mismatch",
            GeoError::SourceUnavailable { .. } => "source_unavailable",
            GeoError::ColumnCollision { .. } => "column_collision",
            GeoError::VintageMismatch { .. } => "vintage_mismatch",
            GeoError::Timeout { .. } => "timeout",
            GeoError::InvalidCatalogue { .. } => "invalid_catalogue",
            GeoError::InvalidDataset { .. } => "invalid_dataset",
            GeoError::Config(_) => "config",
        }
    }

    pub(crate) fn unavailable(spec: impl ToString, reason: impl ToString) -> Self {
        GeoError::SourceUnavailable { spec: spec.to_string(), reason: reason.to_string() }
    }

    /// Wrap an `anyhow` chain from an IO/parsing collaborator, keeping every cause in the message.
    pub(crate) fn from_source_error(spec: impl ToString, err: anyhow::Error) -> Self {
        GeoError::unavailable(spec, format!("{err:#}"))
    }
}

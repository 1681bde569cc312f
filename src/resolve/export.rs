use anyhow::{ensure, Context};
use polars::{frame::DataFrame, prelude::{Column as FrameColumn, NamedFrom}, series::Series};

use crate::{
    area::{GeoIdentifier, Granularity},
    common::write_to_csv_bytes,
};
use super::policy::{OnUnresolved, ResolutionResult};

/// Column holding the caller's identifier in exported resolutions.
pub const IDENTIFIER_COLUMN: &str = "identifier";

/// Two-column table of a resolved batch: `identifier` and a column named after
/// `granularity`. `Skip` drops unresolved rows, `Null` leaves their code empty and
/// `Fail` returns the first error.
pub fn resolutions_to_dataframe(
    identifiers: &[GeoIdentifier],
    results: &[ResolutionResult],
    granularity: Granularity,
    policy: OnUnresolved,
) -> anyhow::Result<DataFrame> {
    ensure!(
        identifiers.len() == results.len(),
        "{} identifiers but {} results", identifiers.len(), results.len()
    );

    let mut raw = Vec::with_capacity(identifiers.len());
    let mut codes = Vec::with_capacity(identifiers.len());
    for (identifier, result) in identifiers.iter().zip(results) {
        match (result, policy) {
            (Ok(code), _) => codes.push(Some(&**code)),
            (Err(err), OnUnresolved::Fail) => return Err(err.clone().into()),
            (Err(_), OnUnresolved::Skip) => continue,
            (Err(_), OnUnresolved::Null) => codes.push(None),
        }
        raw.push(identifier.raw());
    }

    let columns: Vec<FrameColumn> = vec![
        Series::new(IDENTIFIER_COLUMN.into(), raw).into(),
        Series::new(granularity.to_str().into(), codes).into(),
    ];
    DataFrame::new(columns).context("Failed to build resolution DataFrame")
}

/// [`resolutions_to_dataframe`] written as CSV; fields are quoted where needed.
pub fn resolutions_to_csv(
    identifiers: &[GeoIdentifier],
    results: &[ResolutionResult],
    granularity: Granularity,
    policy: OnUnresolved,
) -> anyhow::Result<Vec<u8>> {
    let df = resolutions_to_dataframe(identifiers, results, granularity, policy)?;
    write_to_csv_bytes(&df)
}

use std::io::Write;

use anyhow::{Context, Result};
use geostat::{resolve::{resolutions_to_csv, BatchReport}, GeoIdentifier};

use super::{open_session, read_lines};

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::ResolveArgs) -> Result<()> {
    let mut raw = args.identifiers.clone();
    if let Some(path) = &args.input {
        raw.extend(read_lines(path)?);
    }
    let identifiers: Vec<GeoIdentifier> = raw.iter().map(GeoIdentifier::new).collect();

    let session = open_session(cli, &args.catalogue)?;
    let policy = args.on_unresolved.unwrap_or(session.config().on_unresolved);
    let results = session.resolve_many(&identifiers)?;
    let report = BatchReport::from_results(&results);

    let csv = resolutions_to_csv(&identifiers, &results, session.granularity(), policy)?;
    std::io::stdout().lock().write_all(&csv).context("Failed to write resolutions")?;

    eprintln!("[resolve] {report}");
    Ok(())
}

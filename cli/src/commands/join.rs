use anyhow::{bail, Result};

use super::open_session;

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::JoinArgs) -> Result<()> {
    let out_path = &args.output.clone().unwrap_or("./joined.csv".into());
    let session = open_session(cli, &args.catalogue)?;
    let source_granularity = args.source_granularity.unwrap_or(session.granularity());

    let mut datasets = Vec::with_capacity(args.datasets.len());
    for path in &args.datasets {
        let mut spec = session.file_source(path);
        spec.granularity = source_granularity;
        if cli.verbose > 0 {
            eprintln!("[join] loading {}", spec.describe());
        }
        datasets.push(session.load(&spec)?);
    }

    let mut spec = session.join_spec().with_rate_scale(args.scale);
    if args.population {
        spec = spec.with_population_denominator();
    } else if let Some(denominator) = &args.denominator {
        let Some((dataset, column)) = denominator.split_once('.') else {
            bail!("denominator must be written as DATASET.COLUMN, got {denominator:?}");
        };
        spec = spec.with_denominator_column(dataset, column);
    }

    let refs: Vec<&geostat::Dataset> = datasets.iter().map(|d| &**d).collect();
    let frame = session.join(&refs, &spec)?;
    for warning in &frame.provenance().warnings {
        eprintln!("[join] warning: {warning}");
    }

    eprintln!("[join] writing {} rows to {}", frame.len(), out_path.display());
    frame.write_csv(out_path)?;
    Ok(())
}

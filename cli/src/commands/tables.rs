use std::io::Write;

use anyhow::{Context, Result};
use geostat::{dataset::nomis, DatasetLoader};

use super::load_config;

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::TablesArgs) -> Result<()> {
    let config = load_config(cli)?;
    let loader = DatasetLoader::from_config(&config)?;

    let tables = if args.sources {
        loader.nomis_tables_with_sources()?
    } else {
        loader.nomis_tables()?
    };
    let csv = nomis::tables_to_csv(&tables)?;

    match &args.output {
        Some(path) => {
            eprintln!("[tables] writing {} tables to {}", tables.len(), path.display());
            std::fs::write(path, &csv).with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => std::io::stdout().lock().write_all(&csv).context("Failed to write tables")?,
    }
    Ok(())
}

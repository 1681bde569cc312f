pub mod join;
pub mod resolve;
pub mod tables;

use std::path::Path;

use anyhow::{Context, Result};
use geostat::{
    Catalogue, CatalogueBuilder, DatasetLoader, EngineConfig, LookupColumns, Session, SourceSpec, Vintage,
};

use crate::cli::{CatalogueArgs, Cli};

/// Configuration file, or defaults without one.
pub(crate) fn load_config(cli: &Cli) -> Result<EngineConfig> {
    Ok(match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    })
}

/// Configuration with command-line overrides applied.
pub(crate) fn engine_config(cli: &Cli, args: &CatalogueArgs) -> Result<EngineConfig> {
    let mut config = load_config(cli)?;
    if let Some(vintage) = &args.vintage {
        config.vintage = Vintage::new(vintage);
    }
    if let Some(granularity) = args.granularity {
        config.granularity = granularity;
    }
    Ok(config)
}

fn build_catalogue(config: &EngineConfig, args: &CatalogueArgs) -> Result<Catalogue> {
    let bytes = std::fs::read(&args.lookup)
        .with_context(|| format!("Failed to read lookup {}", args.lookup.display()))?;
    let mut builder = CatalogueBuilder::from_lookup_csv(config.vintage.clone(), &bytes, &LookupColumns::default())?;

    if let Some(path) = &args.populations {
        let spec = SourceSpec::file(path, config.vintage.clone(), args.population_granularity)
            .with_value_columns([&args.population_column]);
        let populations = DatasetLoader::new().load(&spec)?;
        builder = builder.populations_from(&populations, &args.population_column)?;
    }
    Ok(Catalogue::new().with_vintage(builder.build()?))
}

/// Session over the lookup named by `args`.
pub(crate) fn open_session(cli: &Cli, args: &CatalogueArgs) -> Result<Session> {
    let config = engine_config(cli, args)?;
    if cli.verbose > 0 {
        eprintln!("[geostat] building {} catalogue from {}", config.vintage, args.lookup.display());
    }
    let catalogue = build_catalogue(&config, args)?;
    Ok(Session::new(config, catalogue)?)
}

pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

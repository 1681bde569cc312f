use std::path::PathBuf;

use geostat::{Granularity, OnUnresolved};

/// Geographic lookup and statistics join CLI
#[derive(clap::Parser, Debug)]
#[command(name = "geostat", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Resolve identifiers (postcodes, codes, names) to canonical area codes
    Resolve(ResolveArgs),

    /// Join CSV datasets on canonical area code and compute rates
    Join(JoinArgs),

    /// List NOMIS tables, optionally with the source each is attributed to
    Tables(TablesArgs),
}

#[derive(clap::Args, Debug)]
pub struct CatalogueArgs {
    /// Postcode lookup CSV (pcds, lsoa21cd, lsoa21nm, lad22cd, lad22nm)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub lookup: PathBuf,

    /// CSV of populations keyed by a `code` column
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub populations: Option<PathBuf>,

    /// Column of the populations file holding counts
    #[arg(long, default_value = "population")]
    pub population_column: String,

    /// Granularity of the populations file
    #[arg(long, default_value = "lsoa")]
    pub population_granularity: Granularity,

    /// Catalogue vintage, overrides the configuration
    #[arg(long)]
    pub vintage: Option<String>,

    /// Target granularity, overrides the configuration
    #[arg(short, long)]
    pub granularity: Option<Granularity>,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub catalogue: CatalogueArgs,

    /// Identifiers to resolve
    pub identifiers: Vec<String>,

    /// Text file with one identifier per line
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// What to do with identifiers that do not resolve
    #[arg(long)]
    pub on_unresolved: Option<OnUnresolved>,
}

#[derive(clap::Args, Debug)]
pub struct JoinArgs {
    #[command(flatten)]
    pub catalogue: CatalogueArgs,

    /// Dataset CSV files keyed by a `code` column
    #[arg(short, long = "dataset", required = true, value_hint = clap::ValueHint::FilePath)]
    pub datasets: Vec<PathBuf>,

    /// Granularity the dataset files are at, defaults to the target granularity
    #[arg(long)]
    pub source_granularity: Option<Granularity>,

    /// Divide by catalogue populations
    #[arg(long, conflicts_with = "denominator")]
    pub population: bool,

    /// Divide by a dataset column, written as DATASET.COLUMN
    #[arg(long)]
    pub denominator: Option<String>,

    /// Multiplier applied to rates, e.g. 1000 for per-thousand
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Output CSV file, defaults to "./joined.csv"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct TablesArgs {
    /// Look up each table's source (one request per table)
    #[arg(long)]
    pub sources: bool,

    /// Output CSV file, defaults to stdout
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

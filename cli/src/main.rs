mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{join, resolve, tables};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match &cli.command {
        Commands::Resolve(args) => resolve::run(&cli, args),
        Commands::Join(args) => join::run(&cli, args),
        Commands::Tables(args) => tables::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }

//! CLI entry point for cxxscrape.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// cxxscrape — extract a flat C ABI model from a C++ binding source.
#[derive(Parser, Debug)]
#[command(name = "cxxscrape", version, about)]
struct Cli {
    /// Path to the cxxscrape.toml configuration file.
    #[arg(default_value = "cxxscrape.toml")]
    config: PathBuf,

    /// Output file path (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cxxscrape=info")),
        )
        .init();

    let cli = Cli::parse();
    cxxscrape::run(&cli.config, cli.output.as_deref())?;
    Ok(())
}

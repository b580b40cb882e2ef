//! Calibra CLI - Command-line interface for model calibration.
//!
//! # Usage
//!
//! ```bash
//! # Fit a Nelson-Siegel curve to yields in a CSV file (columns x,y[,sigma])
//! calibra fit --data yields.csv --model nelson-siegel
//!
//! # Smooth noisy data with a cubic P-spline
//! calibra smooth --data noisy.csv --intervals 12 --lambda 0.5
//!
//! # Bootstrap zero rates from annual par swap rates (columns tenor,rate)
//! calibra bootstrap --data swaps.csv --update broyden
//!
//! # Show the effective solver configuration
//! calibra config --config calibra.toml
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod error;
mod models;
mod output;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let format = cli.format;

    match cli.command {
        Commands::Fit(args) => commands::fit::execute(args, format)?,
        Commands::Smooth(args) => commands::smooth::execute(args, format)?,
        Commands::Bootstrap(args) => commands::bootstrap::execute(args, format)?,
        Commands::Config(args) => commands::config::execute(args, format)?,
    }

    Ok(())
}

/// Logs go to stderr so table, JSON and CSV output stay machine-readable.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A second initialisation (only possible in tests) is not an error worth reporting.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

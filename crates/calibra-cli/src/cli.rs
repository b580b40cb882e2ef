//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::commands::{BootstrapArgs, ConfigArgs, FitArgs, SmoothArgs};

/// Calibra - Fit models to data with Newton and least-squares solvers
#[derive(Parser)]
#[command(name = "calibra")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fit a parametric model to data by non-linear least squares
    Fit(FitArgs),

    /// Smooth data with a penalized B-spline
    Smooth(SmoothArgs),

    /// Bootstrap zero rates from annual par swap rates
    Bootstrap(BootstrapArgs),

    /// Show the effective solver configuration
    Config(ConfigArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

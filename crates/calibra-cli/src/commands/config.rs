//! Config command implementation.
//!
//! Solver settings come from the built-in defaults, optionally overridden by a
//! TOML file with `[solver]` and `[least_squares]` tables:
//!
//! ```toml
//! [solver]
//! tolerance = 1e-10
//! update = "sherman_morrison"
//!
//! [solver.line_search]
//! max_steps = 40
//!
//! [least_squares]
//! decomposition = "qr"
//! damping_factor = 5.0
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::debug;

use calibra_math::optimization::LeastSquaresConfig;
use calibra_math::solvers::SolverConfig;

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use crate::output::{print_csv, print_header, print_json, KeyValue};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// TOML file with [solver] and [least_squares] tables
    #[arg(short, long, env = "CALIBRA_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Settings for every solver the CLI drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibraConfig {
    /// Newton root finder (used by `bootstrap`).
    pub solver: SolverConfig,
    /// Levenberg-Marquardt fitter (used by `fit`).
    pub least_squares: LeastSquaresConfig,
}

impl CalibraConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> CliResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CliError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file at `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => {
                debug!("loading configuration from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Checks both solver tables.
    pub fn validate(&self) -> CliResult<()> {
        self.solver
            .validate()
            .map_err(|e| CliError::Config(format!("[solver] {e}")))?;
        self.least_squares
            .validate()
            .map_err(|e| CliError::Config(format!("[least_squares] {e}")))
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Flattens the configuration into dotted `table.key` pairs.
    pub fn entries(&self) -> CliResult<Vec<KeyValue>> {
        let value = toml::Value::try_from(self).map_err(|e| CliError::Config(e.to_string()))?;
        let mut entries = Vec::new();
        flatten("", &value, &mut entries);
        Ok(entries)
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut Vec<KeyValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, value) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, value, out);
            }
        }
        toml::Value::String(s) => out.push(KeyValue::new(prefix, s.as_str())),
        other => out.push(KeyValue::new(prefix, other.to_string())),
    }
}

/// Execute the config command.
pub fn execute(args: ConfigArgs, format: OutputFormat) -> Result<()> {
    let config = CalibraConfig::load(args.config.as_deref())?;

    match format {
        OutputFormat::Table => {
            print_header("Effective Configuration");
            print!("{}", config.to_toml()?);
        }
        OutputFormat::Json => {
            print_json(&config)?;
        }
        OutputFormat::Csv => {
            print_csv(&config.entries()?)?;
        }
    }

    Ok(())
}

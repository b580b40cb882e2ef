//! CLI command implementations.

pub mod bootstrap;
pub mod config;
pub mod fit;
pub mod smooth;

// Re-export submodules for convenience
pub use bootstrap::BootstrapArgs;
pub use config::ConfigArgs;
pub use fit::FitArgs;
pub use smooth::SmoothArgs;

use std::path::Path;

use clap::ValueEnum;
use serde::Deserialize;
use tracing::info;

use calibra_math::linear_algebra::DecompositionMethod;

use crate::error::{CliError, CliResult};

/// Decomposition choices exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecompositionChoice {
    /// LU with partial pivoting
    Lu,
    /// Singular value decomposition
    Svd,
    /// Householder QR
    Qr,
}

impl From<DecompositionChoice> for DecompositionMethod {
    fn from(choice: DecompositionChoice) -> Self {
        match choice {
            DecompositionChoice::Lu => DecompositionMethod::Lu,
            DecompositionChoice::Svd => DecompositionMethod::Svd,
            DecompositionChoice::Qr => DecompositionMethod::Qr,
        }
    }
}

/// One CSV row: `x,y` with an optional `sigma` column.
#[derive(Debug, Deserialize)]
struct ObservationRecord {
    x: f64,
    y: f64,
    #[serde(default)]
    sigma: Option<f64>,
}

/// Observations read from a data file.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    /// Abscissae.
    pub x: Vec<f64>,
    /// Observed values.
    pub y: Vec<f64>,
    /// Standard deviations (1 where the file gives none).
    pub sigma: Vec<f64>,
}

impl Observations {
    /// Number of observations.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True when there are no observations.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Reads `x,y[,sigma]` observations from a CSV file with a header row.
pub fn read_observations(path: &Path) -> CliResult<Observations> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let name = path.display().to_string();

    let mut observations = Observations {
        x: Vec::new(),
        y: Vec::new(),
        sigma: Vec::new(),
    };
    for (row, record) in reader.deserialize::<ObservationRecord>().enumerate() {
        let record = record?;
        let sigma = record.sigma.unwrap_or(1.0);
        if !(record.x.is_finite() && record.y.is_finite()) {
            return Err(CliError::data(&name, format!("row {} is not finite", row + 1)));
        }
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(CliError::data(
                &name,
                format!("row {} has sigma {sigma}; sigma must be positive", row + 1),
            ));
        }
        observations.x.push(record.x);
        observations.y.push(record.y);
        observations.sigma.push(sigma);
    }

    if observations.is_empty() {
        return Err(CliError::data(&name, "no observations"));
    }
    info!("read {} observations from {}", observations.len(), name);
    Ok(observations)
}

//! Bootstrap command implementation.
//!
//! Solves for the continuously compounded zero rates at which annual-pay
//! par swaps reprice to par. Zero rates are linear between pillar tenors and
//! flat before the first one, so all swaps are solved simultaneously with the
//! Newton root finder.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::{info, warn};

use calibra_math::jacobian::JacobianUpdate;
use calibra_math::linear_algebra::Vector;
use calibra_math::solvers::{NewtonVectorRootFinder, SolverConfig, VectorRootFinder};

use crate::cli::OutputFormat;
use crate::commands::config::CalibraConfig;
use crate::commands::DecompositionChoice;
use crate::error::{CliError, CliResult};
use crate::output::{
    format_number, format_percent, print_csv, print_header, print_json, print_success, print_table,
    KeyValue,
};

/// Arguments for the bootstrap command.
#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// CSV file with columns tenor (whole years) and rate
    #[arg(short, long)]
    pub data: PathBuf,

    /// Rates in the file are in percent
    #[arg(long)]
    pub percent: bool,

    /// Jacobian update: full, broyden or sherman-morrison (overrides the config)
    #[arg(long)]
    pub update: Option<JacobianUpdate>,

    /// Decomposition for Newton directions (overrides the config)
    #[arg(long, value_enum)]
    pub decomposition: Option<DecompositionChoice>,

    /// TOML file with [solver] and [least_squares] tables
    #[arg(short, long, env = "CALIBRA_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SwapRecord {
    tenor: f64,
    rate: f64,
}

/// Par swap quotes with whole-year tenors.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuotes {
    /// Maturities in years, strictly increasing.
    pub tenors: Vec<u32>,
    /// Par rates as decimals.
    pub rates: Vec<f64>,
}

impl SwapQuotes {
    /// Validates tenors and rates.
    pub fn new(tenors: Vec<f64>, rates: Vec<f64>) -> CliResult<Self> {
        if tenors.is_empty() || tenors.len() != rates.len() {
            return Err(CliError::InvalidArgument(format!(
                "need matching non-empty tenors and rates, got {} and {}",
                tenors.len(),
                rates.len()
            )));
        }

        let mut whole = Vec::with_capacity(tenors.len());
        for &tenor in &tenors {
            if !(tenor >= 1.0 && tenor <= f64::from(u32::MAX) && tenor.fract() == 0.0) {
                return Err(CliError::InvalidArgument(format!(
                    "tenor {tenor} is not a whole number of years"
                )));
            }
            let tenor = tenor as u32;
            if whole.last().is_some_and(|&last| tenor <= last) {
                return Err(CliError::InvalidArgument(
                    "tenors must be strictly increasing".into(),
                ));
            }
            whole.push(tenor);
        }
        if let Some(rate) = rates.iter().find(|r| !r.is_finite()) {
            return Err(CliError::InvalidArgument(format!("rate {rate} is not finite")));
        }

        Ok(Self {
            tenors: whole,
            rates,
        })
    }

    /// Reads `tenor,rate` rows.
    pub fn read(path: &Path, percent: bool) -> CliResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let scale = if percent { 0.01 } else { 1.0 };

        let mut tenors = Vec::new();
        let mut rates = Vec::new();
        for record in reader.deserialize::<SwapRecord>() {
            let record = record?;
            tenors.push(record.tenor);
            rates.push(record.rate * scale);
        }
        Self::new(tenors, rates)
            .map_err(|e| CliError::data(path.display().to_string(), e.to_string()))
    }

    /// Zero rate at `t` from pillar values `zero_rates`.
    fn interpolate(&self, zero_rates: &Vector, t: f64) -> f64 {
        let first = f64::from(self.tenors[0]);
        if t <= first {
            return zero_rates[0];
        }
        for k in 1..self.tenors.len() {
            let (left, right) = (f64::from(self.tenors[k - 1]), f64::from(self.tenors[k]));
            if t <= right {
                let w = (t - left) / (right - left);
                return zero_rates[k - 1] * (1.0 - w) + zero_rates[k] * w;
            }
        }
        zero_rates[zero_rates.len() - 1]
    }

    fn discount(&self, zero_rates: &Vector, t: f64) -> f64 {
        (-self.interpolate(zero_rates, t) * t).exp()
    }

    /// `1 − D(Tᵢ) − Sᵢ·Σₖ D(k)` for every swap; zero at the solution.
    pub fn pricing_errors(&self, zero_rates: &Vector) -> Vector {
        self.tenors
            .iter()
            .zip(&self.rates)
            .map(|(&tenor, &rate)| {
                let annuity: f64 = (1..=tenor)
                    .map(|k| self.discount(zero_rates, f64::from(k)))
                    .sum();
                1.0 - self.discount(zero_rates, f64::from(tenor)) - rate * annuity
            })
            .collect()
    }
}

/// One solved pillar.
#[derive(Debug, Clone, Serialize)]
pub struct Pillar {
    pub tenor: u32,
    pub par_rate: f64,
    pub zero_rate: f64,
    pub discount_factor: f64,
}

/// Everything the bootstrap command reports.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub method: String,
    pub iterations: u32,
    pub residual_norm: f64,
    pub pillars: Vec<Pillar>,
}

/// Solves for the zero rates that reprice every quote.
pub fn bootstrap(quotes: &SwapQuotes, config: SolverConfig) -> CliResult<BootstrapReport> {
    let finder = NewtonVectorRootFinder::new(config);
    let start = Vector::from_slice(&quotes.rates);
    info!(
        "bootstrapping {} swaps with {} ({:?} decomposition)",
        quotes.tenors.len(),
        finder.name(),
        config.decomposition
    );

    let result = finder
        .find_root_numerical(|z: &Vector| quotes.pricing_errors(z), &start)
        .map_err(|e| {
            warn!("bootstrap failed: {}", e);
            e
        })?;

    let pillars = quotes
        .tenors
        .iter()
        .zip(&quotes.rates)
        .enumerate()
        .map(|(k, (&tenor, &par_rate))| Pillar {
            tenor,
            par_rate,
            zero_rate: result.root[k],
            discount_factor: quotes.discount(&result.root, f64::from(tenor)),
        })
        .collect();

    Ok(BootstrapReport {
        method: config.update.name().to_string(),
        iterations: result.iterations,
        residual_norm: result.residual_norm,
        pillars,
    })
}

/// Execute the bootstrap command.
pub fn execute(args: BootstrapArgs, format: OutputFormat) -> Result<()> {
    let mut config = CalibraConfig::load(args.config.as_deref())?.solver;
    if let Some(update) = args.update {
        config = config.with_update(update);
    }
    if let Some(choice) = args.decomposition {
        config = config.with_decomposition(choice.into());
    }

    let quotes = SwapQuotes::read(&args.data, args.percent)?;
    let report = bootstrap(&quotes, config)?;

    #[derive(Tabled)]
    struct PillarRow {
        #[tabled(rename = "Tenor")]
        tenor: String,
        #[tabled(rename = "Par Rate")]
        par_rate: String,
        #[tabled(rename = "Zero Rate")]
        zero_rate: String,
        #[tabled(rename = "Discount Factor")]
        discount_factor: String,
    }

    match format {
        OutputFormat::Table => {
            print_header(&format!("Zero Curve ({})", report.method));
            let rows: Vec<PillarRow> = report
                .pillars
                .iter()
                .map(|p| PillarRow {
                    tenor: format!("{}Y", p.tenor),
                    par_rate: format_percent(p.par_rate),
                    zero_rate: format_percent(p.zero_rate),
                    discount_factor: format!("{:.8}", p.discount_factor),
                })
                .collect();
            print_table(&rows)?;

            let summary = vec![
                KeyValue::new("Iterations", report.iterations.to_string()),
                KeyValue::new("Residual norm", format_number(report.residual_norm)),
            ];
            print_table(&summary)?;
            print_success(&format!("repriced {} swaps", report.pillars.len()));
        }
        OutputFormat::Json => {
            print_json(&report)?;
        }
        OutputFormat::Csv => {
            print_csv(&report.pillars)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sequential_zero_rates(rates: &[f64]) -> Vec<f64> {
        let mut discount: Vec<f64> = Vec::new();
        for rate in rates {
            let annuity: f64 = discount.iter().sum();
            discount.push((1.0 - rate * annuity) / (1.0 + rate));
        }
        discount
            .iter()
            .enumerate()
            .map(|(k, d)| -d.ln() / (k + 1) as f64)
            .collect()
    }

    #[test]
    fn test_consecutive_tenors_match_sequential_bootstrap() {
        let rates = vec![0.03, 0.035, 0.04];
        let quotes = SwapQuotes::new(vec![1.0, 2.0, 3.0], rates.clone()).unwrap();
        let expected = sequential_zero_rates(&rates);

        for update in [
            JacobianUpdate::Full,
            JacobianUpdate::Broyden,
            JacobianUpdate::ShermanMorrison,
        ] {
            let report = bootstrap(&quotes, SolverConfig::default().with_update(update)).unwrap();
            assert_eq!(report.method, update.name());
            for (pillar, expected) in report.pillars.iter().zip(&expected) {
                assert_relative_eq!(pillar.zero_rate, *expected, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_interpolated_pillars_reprice() {
        let quotes =
            SwapQuotes::new(vec![1.0, 2.0, 5.0, 10.0], vec![0.03, 0.035, 0.04, 0.042]).unwrap();
        let report = bootstrap(&quotes, SolverConfig::default()).unwrap();

        let zero_rates: Vector = report.pillars.iter().map(|p| p.zero_rate).collect();
        for error in quotes.pricing_errors(&zero_rates).iter() {
            assert!(error.abs() < 1e-8);
        }
        assert_relative_eq!(report.pillars[2].zero_rate, 0.0395117356, epsilon = 1e-7);
        assert!(report
            .pillars
            .windows(2)
            .all(|w| w[1].discount_factor < w[0].discount_factor));
    }

    #[test]
    fn test_interpolation_is_flat_then_linear() {
        let quotes = SwapQuotes::new(vec![2.0, 4.0], vec![0.0, 0.0]).unwrap();
        let z = Vector::new(vec![0.02, 0.04]);
        assert_relative_eq!(quotes.interpolate(&z, 1.0), 0.02);
        assert_relative_eq!(quotes.interpolate(&z, 3.0), 0.03);
        assert_relative_eq!(quotes.interpolate(&z, 4.0), 0.04);
    }

    #[test]
    fn test_invalid_quotes() {
        assert!(SwapQuotes::new(vec![1.5], vec![0.03]).is_err());
        assert!(SwapQuotes::new(vec![2.0, 1.0], vec![0.03, 0.03]).is_err());
        assert!(SwapQuotes::new(vec![0.0], vec![0.03]).is_err());
        assert!(SwapQuotes::new(vec![1.0], vec![f64::NAN]).is_err());
        assert!(SwapQuotes::new(vec![], vec![]).is_err());
    }
}

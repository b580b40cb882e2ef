//! Fit command implementation.
//!
//! Fits a parametric model to `x,y[,sigma]` observations with the
//! Levenberg-Marquardt solver.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tracing::{info, warn};

use calibra_math::linear_algebra::Vector;
use calibra_math::optimization::{
    LeastSquaresConfig, LeastSquaresResult, NoJacobian, NonLinearLeastSquares,
};

use crate::cli::OutputFormat;
use crate::commands::config::CalibraConfig;
use crate::commands::{read_observations, DecompositionChoice, Observations};
use crate::error::{CliError, CliResult};
use crate::models::Model;
use crate::output::{
    format_number, print_csv, print_header, print_json, print_table, print_warning, KeyValue,
};

/// Arguments for the fit command.
#[derive(Args, Debug)]
pub struct FitArgs {
    /// CSV file with columns x,y and an optional sigma column
    #[arg(short, long)]
    pub data: PathBuf,

    /// Model: linear, polynomial:N, exponential or nelson-siegel
    #[arg(short, long, default_value = "linear")]
    pub model: Model,

    /// Starting parameters (comma-separated, e.g. "0.04,-0.02,0,2")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub start: Option<Vec<f64>>,

    /// Restrict every parameter to be non-negative
    #[arg(long)]
    pub positive: bool,

    /// Use finite differences instead of the model's analytic Jacobian
    #[arg(long)]
    pub numerical: bool,

    /// TOML file with [solver] and [least_squares] tables
    #[arg(short, long, env = "CALIBRA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Decomposition for the damped normal equations (overrides the config)
    #[arg(long, value_enum)]
    pub decomposition: Option<DecompositionChoice>,

    /// Show fitted values and residuals
    #[arg(long)]
    pub residuals: bool,
}

/// One fitted parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    pub std_error: f64,
}

/// One observation with its fitted value.
#[derive(Debug, Clone, Serialize)]
pub struct FittedPoint {
    pub x: f64,
    pub observed: f64,
    pub fitted: f64,
    /// `(observed − fitted) / sigma`
    pub normalized_residual: f64,
}

/// Everything the fit command reports.
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub model: String,
    pub parameters: Vec<ParameterEstimate>,
    pub chi_squared: f64,
    pub degrees_of_freedom: usize,
    pub iterations: u32,
    pub points: Vec<FittedPoint>,
}

/// Fits `model` to `data`.
pub fn fit(
    model: Model,
    data: &Observations,
    start: Option<&[f64]>,
    positive: bool,
    numerical: bool,
    config: LeastSquaresConfig,
) -> CliResult<FitReport> {
    let count = model.parameter_count();
    let start = match start {
        Some(values) if values.len() != count => {
            return Err(CliError::InvalidArgument(format!(
                "{model} takes {count} parameters, --start has {}",
                values.len()
            )));
        }
        Some(values) => Vector::from_slice(values),
        None => {
            let guess = model.default_start(&data.x, &data.y);
            if positive {
                guess.map(|v| v.max(0.0))
            } else {
                guess
            }
        }
    };

    let xs = data.x.as_slice();
    let observed = Vector::from_slice(&data.y);
    let sigma = Vector::from_slice(&data.sigma);
    let curve = |p: &Vector| -> Vector { xs.iter().map(|&x| model.evaluate(p, x)).collect() };
    let jacobian = |p: &Vector| model.jacobian(p, xs);
    let feasible =
        |p: &Vector| model.is_admissible(p) && (!positive || p.iter().all(|v| *v >= 0.0));

    info!(
        "fitting {} to {} points from {:?} ({} Jacobian)",
        model,
        data.len(),
        start.as_slice(),
        if numerical { "finite-difference" } else { "analytic" }
    );

    let solver = NonLinearLeastSquares::new(config);
    let outcome = if numerical {
        solver.solve(&observed, &sigma, curve, None::<NoJacobian>, &start, Some(feasible))
    } else {
        solver.solve(&observed, &sigma, curve, Some(jacobian), &start, Some(feasible))
    };
    let result = outcome.map_err(|e| {
        warn!("fit of {} failed: {}", model, e);
        e
    })?;

    Ok(report(model, data, &result))
}

fn report(model: Model, data: &Observations, result: &LeastSquaresResult) -> FitReport {
    let errors = result.standard_errors();
    let parameters = model
        .parameter_names()
        .into_iter()
        .enumerate()
        .map(|(k, name)| ParameterEstimate {
            name,
            value: result.parameters[k],
            std_error: errors[k],
        })
        .collect();

    let points = (0..data.len())
        .map(|i| {
            let fitted = model.evaluate(&result.parameters, data.x[i]);
            FittedPoint {
                x: data.x[i],
                observed: data.y[i],
                fitted,
                normalized_residual: (data.y[i] - fitted) / data.sigma[i],
            }
        })
        .collect();

    FitReport {
        model: model.to_string(),
        parameters,
        chi_squared: result.chi_squared,
        degrees_of_freedom: result.degrees_of_freedom(),
        iterations: result.iterations,
        points,
    }
}

/// Execute the fit command.
pub fn execute(args: FitArgs, format: OutputFormat) -> Result<()> {
    let mut config = CalibraConfig::load(args.config.as_deref())?.least_squares;
    if let Some(choice) = args.decomposition {
        config = config.with_decomposition(choice.into());
    }

    let data = read_observations(&args.data)?;
    let report = fit(
        args.model,
        &data,
        args.start.as_deref(),
        args.positive,
        args.numerical,
        config,
    )?;

    #[derive(Tabled)]
    struct ParameterRow {
        #[tabled(rename = "Parameter")]
        parameter: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Std Error")]
        std_error: String,
    }

    #[derive(Tabled)]
    struct ResidualRow {
        #[tabled(rename = "x")]
        x: String,
        #[tabled(rename = "Observed")]
        observed: String,
        #[tabled(rename = "Fitted")]
        fitted: String,
        #[tabled(rename = "Residual / σ")]
        residual: String,
    }

    let rows: Vec<ParameterRow> = report
        .parameters
        .iter()
        .map(|p| ParameterRow {
            parameter: p.name.clone(),
            value: format_number(p.value),
            std_error: format_number(p.std_error),
        })
        .collect();

    match format {
        OutputFormat::Table => {
            print_header(&format!("Fit: {}", report.model));
            print_table(&rows)?;

            let summary = vec![
                KeyValue::from_number("Chi-squared", report.chi_squared),
                KeyValue::new("Degrees of freedom", report.degrees_of_freedom.to_string()),
                KeyValue::new("Iterations", report.iterations.to_string()),
            ];
            print_table(&summary)?;
            if report.degrees_of_freedom == 0 {
                print_warning("no degrees of freedom left; the fit interpolates the data");
            }

            if args.residuals {
                print_header("Residuals");
                let residuals: Vec<ResidualRow> = report
                    .points
                    .iter()
                    .map(|p| ResidualRow {
                        x: format_number(p.x),
                        observed: format_number(p.observed),
                        fitted: format_number(p.fitted),
                        residual: format_number(p.normalized_residual),
                    })
                    .collect();
                print_table(&residuals)?;
            }
        }
        OutputFormat::Json => {
            print_json(&report)?;
        }
        OutputFormat::Csv => {
            if args.residuals {
                print_csv(&report.points)?;
            } else {
                print_csv(&report.parameters)?;
            }
        }
    }

    Ok(())
}

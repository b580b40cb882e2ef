//! Parametric models fitted by the `fit` command.

use std::fmt;
use std::str::FromStr;

use calibra_math::linear_algebra::{Matrix, Vector};

use crate::error::CliError;

/// Largest supported polynomial degree.
const MAX_POLYNOMIAL_DEGREE: usize = 10;

/// A curve `y = f(x; p)` with named parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// `p0 + p1·x`
    Linear,
    /// `Σ pₖ·xᵏ` up to the given degree.
    Polynomial(usize),
    /// `a·exp(b·x)`
    Exponential,
    /// Nelson-Siegel yield curve `β0 + β1·L(x/τ) + β2·(L(x/τ) − e^(−x/τ))`
    /// with `L(u) = (1 − e^(−u))/u`.
    NelsonSiegel,
}

impl FromStr for Model {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" | "exp" => Ok(Self::Exponential),
            "nelson-siegel" | "nelson_siegel" | "ns" => Ok(Self::NelsonSiegel),
            other => {
                let degree = other
                    .strip_prefix("polynomial:")
                    .or_else(|| other.strip_prefix("poly:"))
                    .and_then(|d| d.parse::<usize>().ok())
                    .ok_or_else(|| CliError::InvalidModel(s.to_string()))?;
                if degree > MAX_POLYNOMIAL_DEGREE {
                    return Err(CliError::InvalidModel(format!(
                        "{s} (degree must be at most {MAX_POLYNOMIAL_DEGREE})"
                    )));
                }
                Ok(Self::Polynomial(degree))
            }
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Polynomial(degree) => write!(f, "polynomial:{degree}"),
            Self::Exponential => write!(f, "exponential"),
            Self::NelsonSiegel => write!(f, "nelson-siegel"),
        }
    }
}

impl Model {
    /// Number of fitted parameters.
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::Linear | Self::Exponential => 2,
            Self::Polynomial(degree) => degree + 1,
            Self::NelsonSiegel => 4,
        }
    }

    /// Display names of the parameters.
    pub fn parameter_names(&self) -> Vec<String> {
        match self {
            Self::Linear => vec!["intercept".into(), "slope".into()],
            Self::Polynomial(degree) => (0..=*degree).map(|k| format!("c{k}")).collect(),
            Self::Exponential => vec!["a".into(), "b".into()],
            Self::NelsonSiegel => {
                vec!["beta0".into(), "beta1".into(), "beta2".into(), "tau".into()]
            }
        }
    }

    /// Evaluates the model at `x`.
    pub fn evaluate(&self, params: &Vector, x: f64) -> f64 {
        match self {
            Self::Linear | Self::Polynomial(_) => params
                .iter()
                .rev()
                .fold(0.0, |acc, &coefficient| acc * x + coefficient),
            Self::Exponential => params[0] * (params[1] * x).exp(),
            Self::NelsonSiegel => {
                let (b0, b1, b2, tau) = (params[0], params[1], params[2], params[3]);
                let u = x / tau;
                let decay = (-u).exp();
                // L(u) → 1 as u → 0
                let loading = if u.abs() < 1e-10 { 1.0 } else { (1.0 - decay) / u };
                b0 + b1 * loading + b2 * (loading - decay)
            }
        }
    }

    /// Analytic Jacobian of the model over the abscissae.
    pub fn jacobian(&self, params: &Vector, xs: &[f64]) -> Matrix {
        match self {
            Self::Linear | Self::Polynomial(_) => {
                Matrix::from_fn(xs.len(), self.parameter_count(), |i, j| xs[i].powi(j as i32))
            }
            Self::Exponential => Matrix::from_fn(xs.len(), 2, |i, j| {
                let e = (params[1] * xs[i]).exp();
                if j == 0 {
                    e
                } else {
                    params[0] * xs[i] * e
                }
            }),
            Self::NelsonSiegel => {
                let (b1, b2, tau) = (params[1], params[2], params[3]);
                let rows: Vec<[f64; 4]> = xs
                    .iter()
                    .map(|&x| {
                        let u = x / tau;
                        let decay = (-u).exp();
                        let (loading, slope) = if u.abs() < 1e-6 {
                            (1.0 - 0.5 * u, -0.5 + u / 3.0)
                        } else {
                            ((1.0 - decay) / u, (decay * (1.0 + u) - 1.0) / (u * u))
                        };
                        let d_tau = (b1 * slope + b2 * (slope + decay)) * (-u / tau);
                        [1.0, loading, loading - decay, d_tau]
                    })
                    .collect();
                Matrix::from_fn(xs.len(), 4, |i, j| rows[i][j])
            }
        }
    }

    /// Whether `params` lie in the model's own domain.
    pub fn is_admissible(&self, params: &Vector) -> bool {
        match self {
            Self::NelsonSiegel => params[3] > 0.0,
            _ => true,
        }
    }

    /// A data-driven starting point.
    pub fn default_start(&self, xs: &[f64], ys: &[f64]) -> Vector {
        let first = ys.first().copied().unwrap_or(0.0);
        let last = ys.last().copied().unwrap_or(0.0);
        match self {
            Self::Linear | Self::Polynomial(_) => Vector::zeros(self.parameter_count()),
            Self::Exponential => {
                let a = if first != 0.0 { first } else { 1.0 };
                Vector::new(vec![a, 0.0])
            }
            Self::NelsonSiegel => {
                let span = xs.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
                let tau = if span > 0.0 { span / 5.0 } else { 1.0 };
                Vector::new(vec![last, first - last, 0.0, tau])
            }
        }
    }
}

//! CLI error types.

use calibra_math::MathError;
use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Unknown or malformed model name.
    #[error("Invalid model: {0}. Use linear, polynomial:N, exponential or nelson-siegel.")]
    InvalidModel(String),

    /// Invalid command-line argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Input data could not be used.
    #[error("Invalid data in {path}: {reason}")]
    Data {
        /// Input file.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The numerical kernel failed.
    #[error("Calculation error: {0}")]
    Calculation(#[from] MathError),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Creates a data error for `path`.
    pub fn data(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Data {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

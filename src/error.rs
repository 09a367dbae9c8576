//! Error types for convbench
//!
//! Only systemic failures travel through [`ConvBenchError`]. Per-configuration
//! failures (a compile that exits nonzero, a benchmark that crashes, runner
//! output without a summary line) are recorded in build outcomes and result
//! rows instead, so one bad configuration never aborts a batch.

use thiserror::Error;

/// Errors that terminate a convbench run
#[derive(Debug, Error)]
pub enum ConvBenchError {
    /// Filesystem operation failed (directory creation, file write, ...)
    #[error("I/O error: {message}")]
    IoError {
        /// Description including the offending path
        message: String,
    },

    /// Result table could not be written or read
    #[error("CSV error in {path}: {reason}")]
    CsvError {
        /// Path of the table
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Configuration file or CLI combination is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input data did not match the expected format
    #[error("Format error: {reason}")]
    FormatError {
        /// Description of the mismatch
        reason: String,
    },

    /// External command could not be launched
    #[error("Failed to execute {program}: {reason}")]
    CommandError {
        /// Program that failed to start
        program: String,
        /// OS error text
        reason: String,
    },

    /// Roofline plot could not be rendered
    #[error("Plot error: {0}")]
    PlotError(String),
}

impl ConvBenchError {
    /// Wrap an [`std::io::Error`] with the path it concerns
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Self::IoError {
            message: format!("{}: {err}", path.as_ref().display()),
        }
    }
}

/// Result type alias for convbench operations
pub type Result<T> = std::result::Result<T, ConvBenchError>;

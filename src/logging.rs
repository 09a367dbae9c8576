//! Tracing subscriber setup
//!
//! Diagnostics go to stderr through `tracing`; the run summaries printed to
//! stdout are unaffected by the level. `RUST_LOG`, when set, takes precedence
//! over the `--log-level` flag.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{ConvBenchError, Result};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Log threshold names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything including per-config progress
    Debug,
    /// Stage progress
    Info,
    /// Recoverable anomalies
    Warning,
    /// Failed compiles and benchmarks
    #[default]
    Error,
    /// Same threshold as `Error`; kept for command line compatibility
    Critical,
}

impl LogLevel {
    /// `tracing` filter directive for this level
    #[must_use]
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConvBenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(ConvBenchError::InvalidConfiguration(format!(
                "unknown log level {other:?} (expected DEBUG, INFO, WARNING, ERROR or CRITICAL)"
            ))),
        }
    }
}

/// Install the global subscriber
///
/// Only the first call has an effect; later calls return `Ok(())`.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if another subscriber was installed
/// outside this function.
pub fn init_logging(level: LogLevel) -> Result<()> {
    if INITIALIZED.set(()).is_err() {
        return Ok(());
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConvBenchError::InvalidConfiguration(format!("logging: {e}")))
}

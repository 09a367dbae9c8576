//! Benchmark executor
//!
//! Runs the device benchmark runner against one compiled artifact at a time.
//! Invocations are strictly sequential: concurrent runs on the same device
//! would contend for it and skew every measured latency.
//!
//! A failed run is data, not an error. [`run_benchmark`] always returns a
//! [`BenchmarkRun`]; spawn failures and timeouts show up as exit code `-1`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::exec::CommandRunner;

pub mod parse;

pub use parse::{
    mean_time_ms, parse_output, Aggregate, BenchmarkEntry, BenchmarkSummary, ParseError,
};

/// Repetitions requested from the runner
pub const DEFAULT_REPETITIONS: u32 = 3;

/// How to invoke the benchmark runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Runner binary
    pub binary: String,
    /// Target device URI (`hip`, `cuda`, `local-task`, ...)
    pub device: String,
    /// Exported function to call
    pub function: String,
    /// Repetitions for the mean/median/stddev aggregates
    pub repetitions: u32,
    /// Device allocator, passed as `--device_allocator` when set
    pub allocator: Option<String>,
    /// Per-run timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            binary: "iree-benchmark-module".to_string(),
            device: "hip".to_string(),
            function: "main".to_string(),
            repetitions: DEFAULT_REPETITIONS,
            allocator: Some("caching".to_string()),
            timeout_secs: None,
        }
    }
}

impl BenchmarkConfig {
    /// Use a different runner binary
    #[must_use]
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    /// Set the target device
    #[must_use]
    pub fn with_device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    /// Set the per-run timeout
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Timeout as a [`Duration`]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Runner arguments for one artifact
    #[must_use]
    pub fn build_args(&self, vmfb: &Path, image_shape: &str, filter_shape: &str) -> Vec<String> {
        let mut args = vec![format!("--device={}", self.device)];
        if let Some(ref allocator) = self.allocator {
            args.push(format!("--device_allocator={allocator}"));
        }
        args.push(format!("--module={}", vmfb.display()));
        args.push(format!("--function={}", self.function));
        args.push(format!("--input={image_shape}"));
        args.push(format!("--input={filter_shape}"));
        args.push(format!("--benchmark_repetitions={}", self.repetitions));
        args
    }
}

/// Raw result of one runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkRun {
    /// Process exit code; `-1` for spawn failure, signal or timeout
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl BenchmarkRun {
    /// Whether the runner exited cleanly
    #[must_use]
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }

    /// Best-effort mean latency in microseconds; `0.0` when unparseable
    #[must_use]
    pub fn mean_latency_us(&self) -> f64 {
        match mean_time_ms(&self.stdout) {
            Ok(ms) => ms * 1000.0,
            Err(e) => {
                if self.ok() {
                    warn!("runner exited cleanly but {e}");
                } else {
                    debug!("{e}");
                }
                0.0
            },
        }
    }
}

/// Benchmark one compiled artifact
pub fn run_benchmark(
    config: &BenchmarkConfig,
    runner: &dyn CommandRunner,
    vmfb: &Path,
    image_shape: &str,
    filter_shape: &str,
) -> BenchmarkRun {
    let args = config.build_args(vmfb, image_shape, filter_shape);
    match runner.run(&config.binary, &args, config.timeout()) {
        Ok(output) => {
            let run = BenchmarkRun {
                exit_code: output.exit_code(),
                stdout: output.stdout,
                stderr: output.stderr,
            };
            if !run.ok() {
                error!(
                    "Benchmark of {} failed with exit code {}\nStderr diagnostics:\n{}\nStdout diagnostics:\n{}",
                    vmfb.display(),
                    run.exit_code,
                    run.stderr,
                    run.stdout
                );
            }
            run
        },
        Err(e) => {
            error!("{e}");
            BenchmarkRun {
                exit_code: -1,
                stdout: String::new(),
                stderr: e.to_string(),
            }
        },
    }
}

// Tests extracted to tests.rs
#[cfg(test)]
#[path = "tests.rs"]
mod bench_tests;

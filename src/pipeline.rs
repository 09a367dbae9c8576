//! Benchmark run mode: compile, aggregate, benchmark, persist
//!
//! ```text
//! configs ──► compile pool (rayon) ──► aggregate ──► benchmark (sequential)
//!                                                        │
//!                                     results CSV ◄── metrics
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::{aggregate, BuildSummary, Submissions};
use crate::bench::{run_benchmark, BenchmarkConfig};
use crate::compile::{compile_all, worker_count, CompilerConfig, OutputDirs, DEFAULT_RESERVED_CPUS};
use crate::config::TaggedConfig;
use crate::error::{ConvBenchError, Result};
use crate::exec::CommandRunner;
use crate::metrics::DerivedMetrics;
use crate::report::{ResultTable, DEFAULT_OUTPUT_CSV};

/// Harness settings, loadable from JSON
///
/// Every field has a default, so a file only needs the keys it overrides:
///
/// ```json
/// { "compiler": { "hip_target": "gfx90a" }, "reserved_cpus": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Compiler invocation
    pub compiler: CompilerConfig,
    /// Benchmark runner invocation
    pub benchmark: BenchmarkConfig,
    /// Result table destination
    pub output_csv: PathBuf,
    /// Root for generated MLIR and compiled artifacts
    pub work_dir: PathBuf,
    /// CPUs left free when sizing the compile pool
    pub reserved_cpus: usize,
    /// Explicit compile pool size, overriding `reserved_cpus`
    pub jobs: Option<usize>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            compiler: CompilerConfig::default(),
            benchmark: BenchmarkConfig::default(),
            output_csv: PathBuf::from(DEFAULT_OUTPUT_CSV),
            work_dir: PathBuf::from("."),
            reserved_cpus: DEFAULT_RESERVED_CPUS,
            jobs: None,
        }
    }
}

impl HarnessConfig {
    /// Load settings from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the file cannot be read and `FormatError` if it is
    /// not valid JSON for this structure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConvBenchError::io(path, &e))?;
        serde_json::from_str(&text).map_err(|e| ConvBenchError::FormatError {
            reason: format!("{}: {e}", path.display()),
        })
    }

    /// Set the result table destination
    #[must_use]
    pub fn with_output_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_csv = path.into();
        self
    }

    /// Set the work directory
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set the explicit pool size
    #[must_use]
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Set the reserved CPU margin
    #[must_use]
    pub fn with_reserved_cpus(mut self, reserved: usize) -> Self {
        self.reserved_cpus = reserved;
        self
    }

    /// Compile pool size
    #[must_use]
    pub fn workers(&self) -> usize {
        match self.jobs {
            Some(jobs) => jobs.max(1),
            None => worker_count(self.reserved_cpus),
        }
    }

    /// Kernel and artifact directories under `work_dir`
    #[must_use]
    pub fn output_dirs(&self) -> OutputDirs {
        OutputDirs::under(&self.work_dir)
    }
}

/// What a benchmark run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Build tally
    pub summary: BuildSummary,
    /// Rows in output order
    pub table: ResultTable,
    /// Where the table was written
    pub output_csv: PathBuf,
}

/// Run the full benchmark pipeline over `configs`
///
/// Compile failures and benchmark failures are recorded as rows with
/// `ok = false`; only directory, pool and CSV errors abort the run.
///
/// A kernel submitted more than once is compiled and benchmarked once. Each
/// later submission gets a row right after the first, carrying its own tag.
///
/// # Errors
///
/// Returns `IoError` if the work directories cannot be created, and any error
/// from building the compile pool or writing the result table.
pub fn run_benchmark_pipeline(
    configs: &[TaggedConfig],
    harness: &HarnessConfig,
    runner: &dyn CommandRunner,
) -> Result<PipelineReport> {
    let dirs = harness.output_dirs();
    dirs.create()?;

    let submissions = Submissions::new(configs);
    if submissions.duplicates() > 0 {
        info!(
            "{} duplicate submissions share an earlier build",
            submissions.duplicates()
        );
    }
    let outcomes = compile_all(
        submissions.unique(),
        &dirs,
        &harness.compiler,
        runner,
        harness.workers(),
    )?;
    let agg = aggregate(outcomes, &submissions);
    println!("{}", agg.summary);
    println!("Compilation process completed.");

    let mut table = ResultTable::new();
    for entry in agg.store.iter() {
        let config = &entry.config;
        let name = config.name();
        info!("Benchmarking {name}");
        let run = run_benchmark(
            &harness.benchmark,
            runner,
            &entry.vmfb_path,
            &config.image_shape(),
            &config.filter_shape(),
        );
        let metrics = DerivedMetrics::compute(config, run.mean_latency_us());
        if run.ok() && !metrics.latency_valid {
            warn!("{name}: no usable latency in runner output");
        }
        table.push(&entry.tag, config, &metrics, run.ok());
        for tag in submissions.extra_tags(&name) {
            table.push(tag, config, &metrics, run.ok());
        }
    }

    for failed in &agg.failures {
        let metrics = DerivedMetrics::compute(&failed.config, 0.0);
        table.push(&failed.tag, &failed.config, &metrics, false);
        for tag in submissions.extra_tags(&failed.config.name()) {
            table.push(tag, &failed.config, &metrics, false);
        }
    }

    table.write_csv(&harness.output_csv)?;
    println!("Results written to {}", harness.output_csv.display());

    Ok(PipelineReport {
        summary: agg.summary,
        table,
        output_csv: harness.output_csv.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_defaults() {
        let h = HarnessConfig::default();
        assert_eq!(h.output_csv, PathBuf::from("results/iree_conv.csv"));
        assert_eq!(h.reserved_cpus, 20);
        assert_eq!(h.benchmark.device, "hip");
        assert!(h.workers() >= 1);
    }

    #[test]
    fn test_explicit_jobs_win() {
        let h = HarnessConfig::default().with_jobs(Some(3));
        assert_eq!(h.workers(), 3);
        assert_eq!(HarnessConfig::default().with_jobs(Some(0)).workers(), 1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("harness.json");
        std::fs::write(
            &path,
            r#"{ "compiler": { "hip_target": "gfx90a" }, "reserved_cpus": 4 }"#,
        )
        .unwrap();
        let h = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(h.compiler.hip_target.as_deref(), Some("gfx90a"));
        assert_eq!(h.compiler.binary, "iree-compile");
        assert_eq!(h.reserved_cpus, 4);
        assert_eq!(h.benchmark, BenchmarkConfig::default());
    }

    #[test]
    fn test_bad_json_is_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("harness.json");
        std::fs::write(&path, "{ reserved_cpus: ").unwrap();
        let err = HarnessConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConvBenchError::FormatError { .. }));
    }

    #[test]
    fn test_output_dirs_follow_work_dir() {
        let h = HarnessConfig::default().with_work_dir("/scratch");
        let dirs = h.output_dirs();
        assert_eq!(dirs.kernel_dir, PathBuf::from("/scratch/conv/mlir"));
        assert_eq!(dirs.vmfb_dir, PathBuf::from("/scratch/conv/vmfb"));
    }
}

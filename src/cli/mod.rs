//! Command line interface
//!
//! The flags are flat: passing `--roofline` switches to roofline mode, and
//! everything else configures a benchmark run. The mode is resolved once in
//! [`Cli::run_mode`] and dispatched by [`entrypoint`].

// CLI glue code - relaxed lint requirements
#![allow(clippy::missing_errors_doc)]

use std::path::PathBuf;

use clap::Parser;

use crate::config::DType;
use crate::error::{ConvBenchError, Result};
use crate::exec::SystemRunner;
use crate::logging::LogLevel;
use crate::pipeline::{run_benchmark_pipeline, HarnessConfig};
use crate::problems::{default_configs, load_configs};
use crate::roofline::{analyze, parse_csv_list, render_plot, DeviceRoofline, RooflineFilter};

/// Compile, benchmark and roofline-analyze 2-D convolution kernels
#[derive(Debug, Clone, Parser)]
#[command(name = "convbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log threshold: DEBUG, INFO, WARNING, ERROR or CRITICAL
    #[arg(long, default_value = "ERROR")]
    pub log_level: LogLevel,

    /// Device the benchmark runner targets
    #[arg(long)]
    pub device: Option<String>,

    /// Comma separated result tables; selects roofline mode
    #[arg(long, value_name = "CSV[,CSV...]")]
    pub roofline: Option<String>,

    /// Roofline plot destination (.png or .svg)
    #[arg(long, requires = "roofline")]
    pub plot: Option<PathBuf>,

    /// Roofline filter: batch size
    #[arg(long, requires = "roofline")]
    pub batch: Option<u64>,

    /// Roofline filter: input dtype
    #[arg(long, requires = "roofline")]
    pub dtype: Option<String>,

    /// Roofline filter: model tag
    #[arg(long, requires = "roofline")]
    pub model: Option<String>,

    /// Roofline compute ceiling in TFLOP/s
    #[arg(long, default_value_t = 1307.4)]
    pub peak_tflops: f64,

    /// Roofline bandwidth ceiling in TB/s
    #[arg(long, default_value_t = 5.3)]
    pub peak_bandwidth: f64,

    /// JSON problem set; the built-in sweep is used when omitted
    #[arg(long)]
    pub configs: Option<PathBuf>,

    /// Result table destination
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Root for generated MLIR and compiled artifacts
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// CPUs left free when sizing the compile pool
    #[arg(long)]
    pub reserved_cpus: Option<usize>,

    /// Compile pool size, overriding --reserved-cpus
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Compiler binary
    #[arg(long)]
    pub compiler: Option<String>,

    /// Benchmark runner binary
    #[arg(long)]
    pub benchmark_binary: Option<String>,

    /// HAL target backend passed to the compiler
    #[arg(long)]
    pub target_backend: Option<String>,

    /// HIP chip passed to the compiler ("none" to omit the flag)
    #[arg(long)]
    pub hip_target: Option<String>,

    /// Per-compile timeout in seconds
    #[arg(long)]
    pub compile_timeout: Option<u64>,

    /// Per-benchmark timeout in seconds
    #[arg(long)]
    pub benchmark_timeout: Option<u64>,

    /// Harness settings file (JSON); flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Inputs of a benchmark run
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOptions {
    /// Resolved harness settings
    pub harness: HarnessConfig,
    /// Problem set file, if any
    pub configs: Option<PathBuf>,
}

/// Inputs of a roofline analysis
#[derive(Debug, Clone, PartialEq)]
pub struct RooflineOptions {
    /// Tables to load
    pub csv_paths: Vec<PathBuf>,
    /// Plot destination, if any
    pub plot: Option<PathBuf>,
    /// Row filters
    pub filter: RooflineFilter,
    /// Device ceilings
    pub device: DeviceRoofline,
}

/// What this invocation does
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Compile and benchmark a problem set
    Benchmark(BenchmarkOptions),
    /// Analyze existing result tables
    Roofline(RooflineOptions),
}

impl Cli {
    /// Resolve flags (and the settings file) into a run mode
    pub fn run_mode(&self) -> Result<RunMode> {
        if let Some(ref list) = self.roofline {
            return Ok(RunMode::Roofline(self.roofline_options(list)?));
        }
        Ok(RunMode::Benchmark(BenchmarkOptions {
            harness: self.harness()?,
            configs: self.configs.clone(),
        }))
    }

    fn roofline_options(&self, list: &str) -> Result<RooflineOptions> {
        if !(self.peak_tflops > 0.0 && self.peak_bandwidth > 0.0) {
            return Err(ConvBenchError::InvalidConfiguration(format!(
                "roofline ceilings must be positive (got {} TFLOP/s, {} TB/s)",
                self.peak_tflops, self.peak_bandwidth
            )));
        }
        let dtype = match self.dtype.as_deref() {
            Some(raw) => Some(
                DType::parse(raw)
                    .ok_or_else(|| {
                        ConvBenchError::InvalidConfiguration(format!("unknown dtype {raw:?}"))
                    })?
                    .as_str()
                    .to_string(),
            ),
            None => None,
        };
        let mut device = DeviceRoofline::default();
        device.peak_tflops = self.peak_tflops;
        device.peak_bandwidth_tbs = self.peak_bandwidth;

        Ok(RooflineOptions {
            csv_paths: parse_csv_list(list)?,
            plot: self.plot.clone(),
            filter: RooflineFilter {
                batch: self.batch,
                dtype,
                model: self.model.clone(),
            },
            device,
        })
    }

    fn harness(&self) -> Result<HarnessConfig> {
        let mut harness = match self.config {
            Some(ref path) => HarnessConfig::from_file(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(ref output) = self.output {
            harness.output_csv = output.clone();
        }
        if let Some(ref dir) = self.work_dir {
            harness.work_dir = dir.clone();
        }
        if let Some(reserved) = self.reserved_cpus {
            harness.reserved_cpus = reserved;
        }
        if self.jobs.is_some() {
            harness.jobs = self.jobs;
        }
        if let Some(ref binary) = self.compiler {
            harness.compiler.binary = binary.clone();
        }
        if let Some(ref backend) = self.target_backend {
            harness.compiler.target_backend = backend.clone();
        }
        if let Some(ref chip) = self.hip_target {
            harness.compiler.hip_target = if chip.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(chip.clone())
            };
        }
        if self.compile_timeout.is_some() {
            harness.compiler.timeout_secs = self.compile_timeout;
        }
        if let Some(ref binary) = self.benchmark_binary {
            harness.benchmark.binary = binary.clone();
        }
        if let Some(ref device) = self.device {
            harness.benchmark.device = device.clone();
        }
        if self.benchmark_timeout.is_some() {
            harness.benchmark.timeout_secs = self.benchmark_timeout;
        }
        Ok(harness)
    }
}

/// Main CLI entrypoint
pub fn entrypoint(cli: &Cli) -> Result<()> {
    match cli.run_mode()? {
        RunMode::Benchmark(opts) => run_benchmarks(&opts),
        RunMode::Roofline(opts) => run_roofline(&opts),
    }
}

/// Benchmark mode
pub fn run_benchmarks(opts: &BenchmarkOptions) -> Result<()> {
    let configs = match opts.configs {
        Some(ref path) => load_configs(path)?,
        None => default_configs(),
    };
    println!("Generated {} conv configs.", configs.len());
    let report = run_benchmark_pipeline(&configs, &opts.harness, &SystemRunner::new())?;
    println!(
        "{} of {} rows ok",
        report.table.ok_count(),
        report.table.len()
    );
    Ok(())
}

/// Roofline mode
pub fn run_roofline(opts: &RooflineOptions) -> Result<()> {
    let report = analyze(&opts.csv_paths, &opts.filter, &opts.device)?;
    print!("{}", report.to_text());
    if let Some(ref dest) = opts.plot {
        render_plot(&report, dest)?;
        println!("Roofline plot saved to {}", dest.display());
    }
    Ok(())
}

// Tests extracted to tests.rs
#[cfg(test)]
#[path = "tests.rs"]
mod cli_tests;

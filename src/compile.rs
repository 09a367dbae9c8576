//! Compilation worker and pool
//!
//! Each configuration is lowered to an MLIR module on disk and handed to the
//! AOT compiler, which emits a `.vmfb` artifact next to it. File names are
//! derived from [`ConvConfig::name`], so re-running a sweep overwrites the
//! previous artifacts instead of accumulating new ones.
//!
//! A compile never returns an error to its caller: every failure mode is
//! folded into a [`BuildOutcome`] without an artifact path.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{ConvConfig, ConvLayout, TaggedConfig};
use crate::error::{ConvBenchError, Result};
use crate::exec::CommandRunner;

/// CPUs left free for the rest of the host when sizing the pool
pub const DEFAULT_RESERVED_CPUS: usize = 20;

/// How to invoke the AOT compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compiler binary
    pub binary: String,
    /// HAL target backend (`rocm`, `cuda`, `llvm-cpu`, ...)
    pub target_backend: String,
    /// HIP chip, passed as `--iree-hip-target` when set
    pub hip_target: Option<String>,
    /// Extra flags appended before `-o`
    pub extra_flags: Vec<String>,
    /// Per-compile timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            binary: "iree-compile".to_string(),
            target_backend: "rocm".to_string(),
            hip_target: Some("gfx942".to_string()),
            extra_flags: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl CompilerConfig {
    /// Use a different compiler binary
    #[must_use]
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    /// Set the HAL target backend
    #[must_use]
    pub fn with_target_backend(mut self, backend: &str) -> Self {
        self.target_backend = backend.to_string();
        self
    }

    /// Set or clear the HIP chip
    #[must_use]
    pub fn with_hip_target(mut self, chip: Option<String>) -> Self {
        self.hip_target = chip;
        self
    }

    /// Set the per-compile timeout
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

    /// Compiler arguments for one module
    #[must_use]
    pub fn build_args(&self, mlir_path: &Path, vmfb_path: &Path) -> Vec<String> {
        let mut args = vec![
            mlir_path.display().to_string(),
            format!("--iree-hal-target-backends={}", self.target_backend),
        ];
        if let Some(ref chip) = self.hip_target {
            args.push(format!("--iree-hip-target={chip}"));
        }
        args.extend(self.extra_flags.iter().cloned());
        args.push("-o".to_string());
        args.push(vmfb_path.display().to_string());
        args
    }
}

/// Where a compile put its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    /// Directory for generated MLIR
    pub kernel_dir: PathBuf,
    /// Directory for compiled `.vmfb` artifacts
    pub vmfb_dir: PathBuf,
}

impl OutputDirs {
    /// `<root>/conv/mlir` and `<root>/conv/vmfb`
    #[must_use]
    pub fn under(root: &Path) -> Self {
        let base = root.join("conv");
        Self {
            kernel_dir: base.join("mlir"),
            vmfb_dir: base.join("vmfb"),
        }
    }

    /// Create both directories
    ///
    /// # Errors
    ///
    /// Returns `IoError` if either directory cannot be created.
    pub fn create(&self) -> Result<()> {
        for dir in [&self.kernel_dir, &self.vmfb_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ConvBenchError::io(dir, &e))?;
        }
        Ok(())
    }
}

/// Result of compiling one configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Category tag of the configuration
    pub tag: String,
    /// The configuration that was compiled
    pub config: ConvConfig,
    /// Generated MLIR file, if it was written
    pub mlir_path: Option<PathBuf>,
    /// Compiled artifact; `None` means the compile failed
    pub vmfb_path: Option<PathBuf>,
}

impl BuildOutcome {
    /// Whether a compiled artifact exists
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.vmfb_path.is_some()
    }
}

/// Render the MLIR module for a configuration
///
/// The module exposes `@main(image, filter) -> output`, zero-fills the
/// accumulator and applies `linalg.conv_2d_<layout>`.
#[must_use]
pub fn generate_mlir(config: &ConvConfig) -> String {
    let lhs = config.image_shape();
    let rhs = config.filter_shape();
    let out = config.output_shape();
    let acc = config.output_dtype();
    let zero = if acc.is_float() { "0.0" } else { "0" };
    let op = match config.layout() {
        ConvLayout::NhwcHwcf => "linalg.conv_2d_nhwc_hwcf",
        ConvLayout::NchwFchw => "linalg.conv_2d_nchw_fchw",
    };
    let stride = config.s();

    let mut mlir = String::new();
    let _ = writeln!(
        mlir,
        "func.func @main(%arg0: tensor<{lhs}>, %arg1: tensor<{rhs}>) -> tensor<{out}> {{"
    );
    let _ = writeln!(mlir, "  %cst = arith.constant {zero} : {acc}");
    let _ = writeln!(mlir, "  %0 = tensor.empty() : tensor<{out}>");
    let _ = writeln!(
        mlir,
        "  %1 = linalg.fill ins(%cst : {acc}) outs(%0 : tensor<{out}>) -> tensor<{out}>"
    );
    let _ = writeln!(
        mlir,
        "  %2 = {op} {{dilations = dense<1> : tensor<2xi64>, strides = dense<{stride}> : tensor<2xi64>}} \
         ins(%arg0, %arg1 : tensor<{lhs}>, tensor<{rhs}>) outs(%1 : tensor<{out}>) -> tensor<{out}>"
    );
    let _ = writeln!(mlir, "  return %2 : tensor<{out}>");
    mlir.push_str("}\n");
    mlir
}

/// Compile one configuration
///
/// Writes `<kernel_dir>/<name>.mlir`, runs the compiler to produce
/// `<vmfb_dir>/<name>.vmfb`, and on failure dumps the compiler output to
/// `<vmfb_dir>/<name>_error.txt`. A clean exit that leaves no artifact
/// counts as a failure.
pub fn compile_config(
    tagged: &TaggedConfig,
    dirs: &OutputDirs,
    compiler: &CompilerConfig,
    runner: &dyn CommandRunner,
) -> BuildOutcome {
    let name = tagged.config.name();
    let mlir_path = dirs.kernel_dir.join(format!("{name}.mlir"));
    let vmfb_path = dirs.vmfb_dir.join(format!("{name}.vmfb"));

    let failed = |mlir: Option<PathBuf>| BuildOutcome {
        tag: tagged.tag.clone(),
        config: tagged.config.clone(),
        mlir_path: mlir,
        vmfb_path: None,
    };

    if let Err(e) = std::fs::write(&mlir_path, generate_mlir(&tagged.config)) {
        error!("{name}: failed to write {}: {e}", mlir_path.display());
        return failed(None);
    }

    let args = compiler.build_args(&mlir_path, &vmfb_path);
    let output = match runner.run(&compiler.binary, &args, compiler.timeout()) {
        Ok(output) => output,
        Err(e) => {
            error!("{name}: {e}");
            return failed(Some(mlir_path));
        },
    };

    let reason = if output.timed_out {
        Some("timed out".to_string())
    } else if !output.success() {
        Some(format!("exit code {}", output.exit_code()))
    } else if !vmfb_path.is_file() {
        Some(format!("exit code 0 but no artifact at {}", vmfb_path.display()))
    } else {
        None
    };

    if let Some(reason) = reason {
        error!("{name}: compilation failed ({reason})");
        let error_path = dirs.vmfb_dir.join(format!("{name}_error.txt"));
        let dump = format!(
            "Command: {} {}\n\nReason: {reason}\n\nStdout:\n{}\n\nStderr:\n{}\n",
            compiler.binary,
            args.join(" "),
            output.stdout,
            output.stderr
        );
        if let Err(e) = std::fs::write(&error_path, dump) {
            error!("{name}: could not write {}: {e}", error_path.display());
        }
        return failed(Some(mlir_path));
    }

    debug!("{name}: compiled to {}", vmfb_path.display());
    BuildOutcome {
        tag: tagged.tag.clone(),
        config: tagged.config.clone(),
        mlir_path: Some(mlir_path),
        vmfb_path: Some(vmfb_path),
    }
}

/// Pool size: available parallelism minus `reserved`, at least one
#[must_use]
pub fn worker_count(reserved: usize) -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    cpus.saturating_sub(reserved).max(1)
}

/// Compile every configuration on a pool of `workers` threads
///
/// Blocks until every job has finished. Outcomes are returned in submission
/// order, one per configuration.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if the thread pool cannot be built.
pub fn compile_all(
    configs: &[TaggedConfig],
    dirs: &OutputDirs,
    compiler: &CompilerConfig,
    runner: &dyn CommandRunner,
    workers: usize,
) -> Result<Vec<BuildOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("convbench-compile-{i}"))
        .build()
        .map_err(|e| ConvBenchError::InvalidConfiguration(format!("thread pool: {e}")))?;

    info!(
        "Compiling {} configs on {} workers",
        configs.len(),
        pool.current_num_threads()
    );

    Ok(pool.install(|| {
        configs
            .par_iter()
            .map(|tagged| compile_config(tagged, dirs, compiler, runner))
            .collect()
    }))
}

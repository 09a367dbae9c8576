//! # convbench
//!
//! Performance characterization harness for 2-D convolution kernels built with
//! an ahead-of-time ML compiler (`iree-compile`) and timed with its device
//! benchmark runner (`iree-benchmark-module`).
//!
//! ## Pipeline
//!
//! 1. **Enumerate** `(tag, ConvConfig)` pairs from the built-in sweep or a JSON
//!    problem set.
//! 2. **Compile** each configuration on a bounded worker pool. A failed compile
//!    is recorded, never fatal.
//! 3. **Aggregate** outcomes into an artifact store and a success/failure tally.
//! 4. **Benchmark** each artifact sequentially and parse the mean latency.
//! 5. **Derive** arithmetic intensity and achieved TFLOP/s, and write a CSV.
//!
//! A separate roofline mode reloads one or more CSVs, filters rows, classifies
//! them against device ceilings and renders a log-log plot.
//!
//! ## Example
//!
//! ```rust
//! use convbench::config::{ConvConfig, DType};
//! use convbench::metrics::DerivedMetrics;
//!
//! let cfg = ConvConfig::new(2, 32, 32, 64, 3, 3, 128, 1, DType::F16, DType::F32);
//! assert_eq!(cfg.image_shape(), "2x34x34x64xf16");
//! assert_eq!(cfg.flops(), 2 * 2 * 32 * 32 * 128 * 64 * 3 * 3);
//!
//! let m = DerivedMetrics::compute(&cfg, 50.0);
//! assert!(m.tflops > 0.0);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // u64 counts -> f64 metrics
#![allow(clippy::too_many_arguments)] // ConvConfig::new mirrors the field list
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)] // Allow float comparisons in tests
#![allow(clippy::many_single_char_names)] // N, H, W, C, P, Q, F, S

/// Build result aggregation
pub mod aggregate;
/// Benchmark runner invocation and output parsing
pub mod bench;
/// CLI command implementations (extracted for testability)
pub mod cli;
/// Kernel lowering and the compile worker pool
pub mod compile;
/// Convolution configuration descriptors
pub mod config;
pub mod error;
/// External command execution
pub mod exec;
pub mod logging;
pub mod metrics;
/// Benchmark run mode
pub mod pipeline;
/// Built-in problem sets and JSON loading
pub mod problems;
pub mod report;
/// Roofline classification and plotting
pub mod roofline;

// Re-exports for convenience
pub use config::{ConvConfig, DType, TaggedConfig};
pub use error::{ConvBenchError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
        assert!(VERSION.contains('.'));
    }
}

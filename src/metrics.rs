//! Derived performance metrics
//!
//! Pure functions of a configuration's FLOP/byte counts and a measured
//! latency. Values are kept at full precision here; rounding happens only
//! when a result table is serialized.

use crate::config::ConvConfig;

/// FLOPs per byte of memory traffic
#[must_use]
pub fn arithmetic_intensity(flops: u64, bytes: u64) -> f64 {
    if bytes == 0 {
        return 0.0;
    }
    flops as f64 / bytes as f64
}

/// Achieved TFLOP/s for a latency in microseconds
///
/// A latency that is zero, negative or not finite carries no timing
/// information; the throughput is reported as `0.0` rather than infinity.
#[must_use]
pub fn tflops_per_second(flops: u64, latency_us: f64) -> f64 {
    if !is_valid_latency(latency_us) {
        return 0.0;
    }
    (flops as f64 / 1e12) / (latency_us / 1e6)
}

/// Whether a latency can be used as a divisor
#[must_use]
pub fn is_valid_latency(latency_us: f64) -> bool {
    latency_us.is_finite() && latency_us > 0.0
}

/// Metrics of one measured configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    /// Mean latency in microseconds
    pub latency_us: f64,
    /// FLOPs per byte
    pub arithmetic_intensity: f64,
    /// Achieved TFLOP/s
    pub tflops: f64,
    /// Whether `latency_us` was a usable measurement
    pub latency_valid: bool,
}

impl DerivedMetrics {
    /// Compute metrics for `config` at `latency_us`
    #[must_use]
    pub fn compute(config: &ConvConfig, latency_us: f64) -> Self {
        let flops = config.flops();
        Self {
            latency_us,
            arithmetic_intensity: arithmetic_intensity(flops, config.byte_count()),
            tflops: tflops_per_second(flops, latency_us),
            latency_valid: is_valid_latency(latency_us),
        }
    }
}

/// Round half away from zero to 4 decimal places
#[must_use]
pub fn round4(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * 1e4).round() / 1e4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DType;

    #[test]
    fn test_arithmetic_intensity() {
        assert!((arithmetic_intensity(1000, 10) - 100.0).abs() < 1e-12);
        assert_eq!(arithmetic_intensity(1000, 0), 0.0);
    }

    #[test]
    fn test_tflops_per_second() {
        // 2e12 FLOPs in 1 second = 2 TFLOP/s
        assert!((tflops_per_second(2_000_000_000_000, 1e6) - 2.0).abs() < 1e-12);
        // 1e9 FLOPs in 100 us = 10 TFLOP/s
        assert!((tflops_per_second(1_000_000_000, 100.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_latency_clamps_to_zero() {
        assert_eq!(tflops_per_second(1_000_000, 0.0), 0.0);
        assert_eq!(tflops_per_second(1_000_000, -3.0), 0.0);
        assert_eq!(tflops_per_second(1_000_000, f64::NAN), 0.0);
        assert!(!is_valid_latency(0.0));
    }

    #[test]
    fn test_derived_metrics_for_config() {
        let cfg = ConvConfig::new(2, 32, 32, 64, 3, 3, 128, 1, DType::F16, DType::F32);
        let m = DerivedMetrics::compute(&cfg, 50.0);
        let expected_tflops = cfg.flops() as f64 / (50.0 * 1e-6) / 1e12;
        assert!((m.tflops - expected_tflops).abs() < 1e-9);
        assert!(
            (m.arithmetic_intensity - cfg.flops() as f64 / cfg.byte_count() as f64).abs() < 1e-12
        );
        assert!(m.latency_valid);

        let failed = DerivedMetrics::compute(&cfg, 0.0);
        assert_eq!(failed.tflops, 0.0);
        assert!(failed.arithmetic_intensity > 0.0);
        assert!(!failed.latency_valid);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(1.234_56), 1.2346);
        assert_eq!(round4(-1.234_56), -1.2346);
        assert_eq!(round4(0.0), 0.0);
        assert!(round4(f64::INFINITY).is_infinite());
    }
}

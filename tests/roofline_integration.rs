//! Roofline mode over persisted result tables
//!
//! Run: cargo test --test roofline_integration

use std::path::{Path, PathBuf};

use convbench::cli::{run_roofline, RooflineOptions};
use convbench::config::{ConvConfig, DType};
use convbench::metrics::DerivedMetrics;
use convbench::report::ResultTable;
use convbench::roofline::{analyze, Boundedness, DeviceRoofline, RooflineFilter};

fn write_run(dir: &Path, file: &str, latency_us: f64) -> PathBuf {
    let mut table = ResultTable::new();
    for &n in &[1u64, 8] {
        for &(dtype, tag) in &[(DType::F16, "unet"), (DType::Bf16, "resnet")] {
            // 1x1 conv: low intensity; 3x3 wide conv: high intensity
            let small = ConvConfig::new(n, 64, 64, 64, 1, 1, 64, 1, dtype, DType::F32);
            let large = ConvConfig::new(n, 64, 64, 1280, 3, 3, 1280, 1, dtype, DType::F32);
            for cfg in [small, large] {
                table.push(tag, &cfg, &DerivedMetrics::compute(&cfg, latency_us), true);
            }
        }
    }
    // One crashed benchmark
    let cfg = ConvConfig::new(8, 64, 64, 64, 1, 1, 64, 1, DType::F16, DType::F32);
    table.push("unet", &cfg, &DerivedMetrics::compute(&cfg, 0.0), false);

    let path = dir.join(file);
    table.write_csv(&path).unwrap();
    path
}

#[test]
fn test_two_runs_compared() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_run(tmp.path(), "baseline.csv", 200.0);
    let b = write_run(tmp.path(), "tuned.csv", 100.0);

    let report = analyze(&[a, b], &RooflineFilter::default(), &DeviceRoofline::default()).unwrap();
    assert_eq!(report.series.len(), 2);
    for series in &report.series {
        assert_eq!(series.loaded, 9);
        assert_eq!(series.matched, 9);
        assert_eq!(series.failed, 1);
        assert_eq!(series.points.len(), 8);
    }

    // Same shapes at half the latency: exactly double the throughput
    for (base, tuned) in report.series[0].points.iter().zip(&report.series[1].points) {
        assert_eq!(base.name, tuned.name);
        assert!((tuned.tflops / base.tflops - 2.0).abs() < 1e-3);
        assert_eq!(base.boundedness, tuned.boundedness);
    }
}

#[test]
fn test_small_and_large_convs_straddle_ridge() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_run(tmp.path(), "run.csv", 100.0);
    let report = analyze(&[a], &RooflineFilter::default(), &DeviceRoofline::default()).unwrap();

    let (memory, compute) = report.bound_counts();
    assert_eq!(memory, 4);
    assert_eq!(compute, 4);
    for p in report.points() {
        if p.name.contains("x1x1x64_") {
            assert_eq!(p.boundedness, Boundedness::MemoryBound);
        } else {
            assert_eq!(p.boundedness, Boundedness::ComputeBound);
        }
    }
}

#[test]
fn test_conjunctive_filter_over_files() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_run(tmp.path(), "a.csv", 100.0);
    let b = write_run(tmp.path(), "b.csv", 100.0);
    let filter = RooflineFilter {
        batch: Some(8),
        dtype: Some("f16".to_string()),
        model: Some("unet".to_string()),
    };
    let report = analyze(&[a, b], &filter, &DeviceRoofline::default()).unwrap();
    for series in &report.series {
        // two ok rows plus the crashed one
        assert_eq!(series.matched, 3);
        assert_eq!(series.failed, 1);
        assert_eq!(series.points.len(), 2);
        assert!(series
            .points
            .iter()
            .all(|p| p.batch == 8 && p.tag == "unet"));
    }
}

#[test]
fn test_run_roofline_without_plot() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_run(tmp.path(), "a.csv", 100.0);
    let opts = RooflineOptions {
        csv_paths: vec![a],
        plot: None,
        filter: RooflineFilter::default(),
        device: DeviceRoofline::default(),
    };
    run_roofline(&opts).unwrap();
}

#[test]
fn test_missing_table_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_run(tmp.path(), "a.csv", 100.0);
    let missing = tmp.path().join("missing.csv");
    let err = analyze(&[a, missing], &RooflineFilter::default(), &DeviceRoofline::default())
        .unwrap_err();
    assert!(err.to_string().contains("missing.csv"));
}

//! Property-based tests for derived metrics, persistence and roofline filters
//!
//! Run: cargo test --test property_metrics

use proptest::prelude::*;

use convbench::config::{ConvConfig, DType};
use convbench::metrics::{round4, DerivedMetrics};
use convbench::report::{ResultRow, ResultTable};
use convbench::roofline::{DeviceRoofline, RooflineFilter};

fn dtype_strategy() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::F32),
        Just(DType::F16),
        Just(DType::Bf16),
        Just(DType::F8E4M3Fnuz),
        Just(DType::I8),
    ]
}

prop_compose! {
    fn conv_config()(
        n in 1u64..=8,
        hw in 1u64..=128,
        c in 1u64..=512,
        window in prop_oneof![Just(1u64), Just(3), Just(5), Just(7)],
        f in 1u64..=512,
        s in 1u64..=2,
        input in dtype_strategy(),
    ) -> ConvConfig {
        let output = if input.is_float() { DType::F32 } else { DType::I32 };
        ConvConfig::new(n, hw, hw, c, window, window, f, s, input, output)
    }
}

// ============================================================================
// Metric properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_metrics_reproducible_from_row(cfg in conv_config(), latency in 1.0f64..1e6) {
        let m = DerivedMetrics::compute(&cfg, latency);
        let row = ResultRow::new(0, "t", &cfg, &m, true);

        let flops = 2.0 * (row.batch * row.h * row.w * row.f * row.c * row.p * row.q) as f64;
        let expected = flops / (row.mean_microseconds * 1e-6) / 1e12;
        prop_assert!((row.tflops - expected).abs() <= expected * 1e-12);
        prop_assert!(row.ok);
    }

    #[test]
    fn prop_nonpositive_latency_never_ok(cfg in conv_config(), latency in -1e3f64..=0.0) {
        let m = DerivedMetrics::compute(&cfg, latency);
        let row = ResultRow::new(0, "t", &cfg, &m, true);
        prop_assert_eq!(row.tflops, 0.0);
        prop_assert!(!row.ok);
        prop_assert!(row.arithmetic_intensity > 0.0);
    }

    #[test]
    fn prop_intensity_independent_of_latency(cfg in conv_config(), a in 1.0f64..1e4, b in 1.0f64..1e4) {
        let ma = DerivedMetrics::compute(&cfg, a);
        let mb = DerivedMetrics::compute(&cfg, b);
        prop_assert_eq!(ma.arithmetic_intensity, mb.arithmetic_intensity);
    }

    #[test]
    fn prop_roof_never_exceeds_peak(intensity in 1e-3f64..1e5) {
        let dev = DeviceRoofline::default();
        let roof = dev.ceiling_at(intensity);
        prop_assert!(roof <= dev.peak_tflops);
        prop_assert!(roof <= dev.peak_bandwidth_tbs * intensity + 1e-9);
    }
}

// ============================================================================
// Persistence properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_csv_reload_keeps_fields(
        configs in prop::collection::vec(conv_config(), 1..8),
        latency in 1.0f64..1e5,
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.csv");
        let mut table = ResultTable::new();
        for cfg in &configs {
            table.push("sweep", cfg, &DerivedMetrics::compute(cfg, latency), true);
        }
        table.write_csv(&path).unwrap();
        let loaded = ResultTable::read_csv(&path).unwrap();

        prop_assert_eq!(loaded.len(), table.len());
        for (orig, back) in table.rows().iter().zip(loaded.rows()) {
            prop_assert_eq!(&orig.name, &back.name);
            prop_assert_eq!(orig.batch, back.batch);
            prop_assert_eq!(orig.index, back.index);
            prop_assert_eq!(&orig.input_dtype, &back.input_dtype);
            prop_assert_eq!(orig.ok, back.ok);
            prop_assert_eq!(round4(orig.tflops), back.tflops);
            prop_assert_eq!(round4(orig.mean_microseconds), back.mean_microseconds);

            // Intensity rebuilt from the persisted shape columns alone
            let in_size = DType::parse(&back.input_dtype).unwrap().size_bytes();
            let out_size = DType::parse(&back.output_dtype).unwrap().size_bytes();
            let in_h = back.h * back.s + back.p - 1;
            let in_w = back.w * back.s + back.q - 1;
            let flops = 2 * back.batch * back.h * back.w * back.f * back.c * back.p * back.q;
            let bytes = back.batch * back.c * in_h * in_w * in_size
                + back.batch * back.f * back.h * back.w * out_size
                + back.p * back.q * back.c * back.f * in_size;
            let intensity = flops as f64 / bytes as f64;
            prop_assert!((intensity - back.arithmetic_intensity).abs() <= 1e-4);
        }
    }

    #[test]
    fn prop_filters_are_conjunctive(
        configs in prop::collection::vec(conv_config(), 1..24),
        batch in 1u64..=8,
        dtype in dtype_strategy(),
    ) {
        let table: ResultTable = configs
            .iter()
            .enumerate()
            .map(|(i, cfg)| {
                let tag = if i % 2 == 0 { "unet" } else { "resnet" };
                ResultRow::new(i, tag, cfg, &DerivedMetrics::compute(cfg, 10.0), true)
            })
            .collect();

        let by_batch = RooflineFilter { batch: Some(batch), ..Default::default() };
        let by_dtype = RooflineFilter { dtype: Some(dtype.to_string()), ..Default::default() };
        let both = RooflineFilter {
            batch: Some(batch),
            dtype: Some(dtype.to_string()),
            model: None,
        };

        let kept: Vec<usize> = both.apply(table.rows()).iter().map(|r| r.index).collect();
        let expected: Vec<usize> = by_batch
            .apply(table.rows())
            .iter()
            .filter(|r| by_dtype.matches(r))
            .map(|r| r.index)
            .collect();
        prop_assert_eq!(kept, expected);

        prop_assert_eq!(RooflineFilter::default().apply(table.rows()).len(), table.len());
    }
}

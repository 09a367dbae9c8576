//! Roofline analysis of persisted result tables
//!
//! Each retained row becomes a point (arithmetic intensity, achieved TFLOP/s)
//! compared against the device roof `min(peak_tflops, bandwidth * intensity)`.
//! Points left of the ridge are memory-bound, the rest compute-bound.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConvBenchError, Result};
use crate::report::{ResultRow, ResultTable};

/// Compute and bandwidth ceilings of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRoofline {
    /// Display name
    pub name: String,
    /// Peak dense throughput in TFLOP/s
    pub peak_tflops: f64,
    /// Peak memory bandwidth in TB/s
    pub peak_bandwidth_tbs: f64,
}

impl Default for DeviceRoofline {
    fn default() -> Self {
        Self::mi300x()
    }
}

impl DeviceRoofline {
    /// AMD Instinct MI300X, FP16 dense
    #[must_use]
    pub fn mi300x() -> Self {
        Self {
            name: "MI300X".to_string(),
            peak_tflops: 1307.4,
            peak_bandwidth_tbs: 5.3,
        }
    }

    /// Custom ceilings
    #[must_use]
    pub fn new(name: &str, peak_tflops: f64, peak_bandwidth_tbs: f64) -> Self {
        Self {
            name: name.to_string(),
            peak_tflops,
            peak_bandwidth_tbs,
        }
    }

    /// Intensity (FLOP/byte) where the two ceilings meet
    #[must_use]
    pub fn ridge_point(&self) -> f64 {
        self.peak_tflops / self.peak_bandwidth_tbs
    }

    /// Attainable TFLOP/s at an intensity
    #[must_use]
    pub fn ceiling_at(&self, intensity: f64) -> f64 {
        (self.peak_bandwidth_tbs * intensity).min(self.peak_tflops)
    }

    /// Which ceiling limits an intensity
    #[must_use]
    pub fn classify(&self, intensity: f64) -> Boundedness {
        if intensity < self.ridge_point() {
            Boundedness::MemoryBound
        } else {
            Boundedness::ComputeBound
        }
    }
}

/// Limiting ceiling for a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundedness {
    /// Left of the ridge: bandwidth limits throughput
    MemoryBound,
    /// Right of the ridge: peak compute limits throughput
    ComputeBound,
}

impl Boundedness {
    /// Short label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryBound => "memory",
            Self::ComputeBound => "compute",
        }
    }
}

/// Conjunctive equality filters; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RooflineFilter {
    /// Batch size (`B` column)
    pub batch: Option<u64>,
    /// Operand dtype (`input_dtype` column)
    pub dtype: Option<String>,
    /// Model family (`tag` column)
    pub model: Option<String>,
}

impl RooflineFilter {
    /// Whether no filter is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_none() && self.dtype.is_none() && self.model.is_none()
    }

    /// Whether a row passes every set filter
    #[must_use]
    pub fn matches(&self, row: &ResultRow) -> bool {
        self.batch.map_or(true, |b| row.batch == b)
            && self.dtype.as_deref().map_or(true, |d| row.input_dtype == d)
            && self.model.as_deref().map_or(true, |m| row.tag == m)
    }

    /// Keep matching rows, in order
    #[must_use]
    pub fn apply<'a>(&self, rows: &'a [ResultRow]) -> Vec<&'a ResultRow> {
        rows.iter().filter(|r| self.matches(r)).collect()
    }
}

/// One row placed on the roofline
#[derive(Debug, Clone, PartialEq)]
pub struct RooflinePoint {
    /// Category tag
    pub tag: String,
    /// Configuration name
    pub name: String,
    /// Batch size
    pub batch: u64,
    /// FLOPs per byte
    pub arithmetic_intensity: f64,
    /// Achieved TFLOP/s
    pub tflops: f64,
    /// Roof at this intensity
    pub ceiling_tflops: f64,
    /// `tflops / ceiling_tflops`
    pub efficiency: f64,
    /// Limiting ceiling
    pub boundedness: Boundedness,
}

impl RooflinePoint {
    fn from_row(row: &ResultRow, device: &DeviceRoofline) -> Self {
        let ceiling = device.ceiling_at(row.arithmetic_intensity);
        Self {
            tag: row.tag.clone(),
            name: row.name.clone(),
            batch: row.batch,
            arithmetic_intensity: row.arithmetic_intensity,
            tflops: row.tflops,
            ceiling_tflops: ceiling,
            efficiency: if ceiling > 0.0 { row.tflops / ceiling } else { 0.0 },
            boundedness: device.classify(row.arithmetic_intensity),
        }
    }
}

/// Points loaded from one table
#[derive(Debug, Clone, PartialEq)]
pub struct RooflineSeries {
    /// Legend label (file stem)
    pub label: String,
    /// Table the points came from
    pub source: PathBuf,
    /// Rows in the table
    pub loaded: usize,
    /// Rows passing the filters
    pub matched: usize,
    /// Matching rows dropped because they are flagged not ok
    pub failed: usize,
    /// Points, in table order
    pub points: Vec<RooflinePoint>,
}

/// Outcome of a roofline analysis
#[derive(Debug, Clone, PartialEq)]
pub struct RooflineReport {
    /// Ceilings used
    pub device: DeviceRoofline,
    /// Filters applied
    pub filter: RooflineFilter,
    /// One series per input table
    pub series: Vec<RooflineSeries>,
}

impl RooflineReport {
    /// All points of all series
    pub fn points(&self) -> impl Iterator<Item = &RooflinePoint> {
        self.series.iter().flat_map(|s| s.points.iter())
    }

    /// Count of points on each side of the ridge: (memory, compute)
    #[must_use]
    pub fn bound_counts(&self) -> (usize, usize) {
        self.points().fold((0, 0), |(m, c), p| match p.boundedness {
            Boundedness::MemoryBound => (m + 1, c),
            Boundedness::ComputeBound => (m, c + 1),
        })
    }

    /// Human-readable report
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Roofline: {} (peak {:.1} TFLOP/s, {:.2} TB/s, ridge {:.1} FLOP/B)",
            self.device.name,
            self.device.peak_tflops,
            self.device.peak_bandwidth_tbs,
            self.device.ridge_point()
        );
        for series in &self.series {
            let _ = writeln!(
                out,
                "{}: {} rows, {} matched, {} plotted, {} failed",
                series.label,
                series.loaded,
                series.matched,
                series.points.len(),
                series.failed
            );
            for p in &series.points {
                let _ = writeln!(
                    out,
                    "  {:<60} {:<8} AI {:>10.2}  {:>9.2} TFLOP/s  {:>6.1}% of roof  {}",
                    p.name,
                    p.tag,
                    p.arithmetic_intensity,
                    p.tflops,
                    p.efficiency * 100.0,
                    p.boundedness.as_str()
                );
            }
        }
        let (memory, compute) = self.bound_counts();
        let _ = writeln!(out, "{memory} memory-bound, {compute} compute-bound");
        out
    }
}

/// Split a comma separated list of table paths
///
/// # Errors
///
/// Returns `InvalidConfiguration` if the list holds no path.
pub fn parse_csv_list(list: &str) -> Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        return Err(ConvBenchError::InvalidConfiguration(
            "roofline needs at least one CSV path".to_string(),
        ));
    }
    Ok(paths)
}

/// Load, filter and classify one or more result tables
///
/// # Errors
///
/// Returns `CsvError` if any table cannot be read.
pub fn analyze(
    paths: &[PathBuf],
    filter: &RooflineFilter,
    device: &DeviceRoofline,
) -> Result<RooflineReport> {
    let mut series = Vec::with_capacity(paths.len());
    for path in paths {
        let table = ResultTable::read_csv(path)?;
        let matched = filter.apply(table.rows());
        let failed = matched.iter().filter(|r| !r.ok).count();
        let points: Vec<RooflinePoint> = matched
            .iter()
            .filter(|r| r.ok)
            .map(|r| RooflinePoint::from_row(r, device))
            .collect();
        info!(
            "{}: {} of {} rows match filters",
            path.display(),
            matched.len(),
            table.len()
        );
        series.push(RooflineSeries {
            label: series_label(path),
            source: path.clone(),
            loaded: table.len(),
            matched: matched.len(),
            failed,
            points,
        });
    }
    Ok(RooflineReport {
        device: device.clone(),
        filter: filter.clone(),
        series,
    })
}

fn series_label(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
}

/// Plot size in pixels
const PLOT_SIZE: (u32, u32) = (1280, 800);

/// Render the report as a log-log roofline chart
///
/// `.svg` destinations use the SVG backend, anything else is rendered as a
/// bitmap whose format follows the extension.
///
/// # Errors
///
/// Returns `IoError` if the destination directory cannot be created and
/// `PlotError` if drawing fails.
pub fn render_plot(report: &RooflineReport, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConvBenchError::io(parent, &e))?;
    }
    let is_svg = dest
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if is_svg {
        draw_roofline(SVGBackend::new(dest, PLOT_SIZE).into_drawing_area(), report)
    } else {
        draw_roofline(BitMapBackend::new(dest, PLOT_SIZE).into_drawing_area(), report)
    }
}

/// Log axis bounds covering `values` and `anchor`, padded by 2x each side
fn axis_bounds(values: impl Iterator<Item = f64>, anchor: f64) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold((anchor, anchor), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (lo / 2.0, hi * 2.0)
}

fn draw_roofline<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    report: &RooflineReport,
) -> Result<()> {
    let plot_err = |e: DrawingAreaErrorKind<DB::ErrorType>| ConvBenchError::PlotError(e.to_string());
    let device = &report.device;
    let ridge = device.ridge_point();

    let (x_lo, x_hi) = axis_bounds(report.points().map(|p| p.arithmetic_intensity), ridge);
    let (y_lo, y_hi) = axis_bounds(report.points().map(|p| p.tflops), device.peak_tflops);

    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Roofline: {}", device.name),
            ("sans-serif", 32),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((x_lo..x_hi).log_scale(), (y_lo..y_hi).log_scale())
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Arithmetic Intensity (FLOP/Byte)")
        .y_desc("Performance (TFLOP/s)")
        .draw()
        .map_err(plot_err)?;

    let roof: Vec<(f64, f64)> = [x_lo, ridge.clamp(x_lo, x_hi), x_hi]
        .into_iter()
        .map(|x| (x, device.ceiling_at(x)))
        .collect();
    chart
        .draw_series(LineSeries::new(roof, RED.stroke_width(3)))
        .map_err(plot_err)?
        .label(format!(
            "{:.2} TB/s / {:.1} TFLOP/s",
            device.peak_bandwidth_tbs, device.peak_tflops
        ))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(3)));

    for (idx, series) in report.series.iter().enumerate() {
        if series.points.is_empty() {
            warn!("{}: nothing to plot", series.label);
            continue;
        }
        let color = Palette99::pick(idx).mix(0.85);
        chart
            .draw_series(
                series
                    .points
                    .iter()
                    .filter(|p| p.arithmetic_intensity > 0.0 && p.tflops > 0.0)
                    .map(|p| Circle::new((p.arithmetic_intensity, p.tflops), 4, color.filled())),
            )
            .map_err(plot_err)?
            .label(series.label.clone())
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

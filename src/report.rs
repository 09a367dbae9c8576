//! Result table and CSV persistence
//!
//! The CSV layout is the harness's contract with downstream tooling:
//!
//! ```text
//! index,tag,name,B,H,W,C,P,Q,F,S,input_dtype,output_dtype,mean_microseconds,arithmetic_intensity,tflops,ok
//! ```
//!
//! The batch column is historically named `B`. Floating point columns are
//! rounded to 4 decimal places on write and nowhere else.

use std::path::Path;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::config::ConvConfig;
use crate::error::{ConvBenchError, Result};
use crate::metrics::{round4, DerivedMetrics};

/// Default location of the result table
pub const DEFAULT_OUTPUT_CSV: &str = "results/iree_conv.csv";

/// Column header, in order
pub const CSV_HEADER: [&str; 17] = [
    "index",
    "tag",
    "name",
    "B",
    "H",
    "W",
    "C",
    "P",
    "Q",
    "F",
    "S",
    "input_dtype",
    "output_dtype",
    "mean_microseconds",
    "arithmetic_intensity",
    "tflops",
    "ok",
];

/// One configuration's measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Position in the table (reporting only)
    pub index: usize,
    /// Category tag
    pub tag: String,
    /// Configuration name
    pub name: String,
    /// Batch size
    #[serde(rename = "B")]
    pub batch: u64,
    /// Output height
    #[serde(rename = "H")]
    pub h: u64,
    /// Output width
    #[serde(rename = "W")]
    pub w: u64,
    /// Input channels
    #[serde(rename = "C")]
    pub c: u64,
    /// Filter height
    #[serde(rename = "P")]
    pub p: u64,
    /// Filter width
    #[serde(rename = "Q")]
    pub q: u64,
    /// Filter count
    #[serde(rename = "F")]
    pub f: u64,
    /// Stride
    #[serde(rename = "S")]
    pub s: u64,
    /// Operand element type
    pub input_dtype: String,
    /// Result element type
    pub output_dtype: String,
    /// Mean latency; `0` when no measurement exists
    #[serde(serialize_with = "serialize_round4")]
    pub mean_microseconds: f64,
    /// FLOPs per byte
    #[serde(serialize_with = "serialize_round4")]
    pub arithmetic_intensity: f64,
    /// Achieved TFLOP/s
    #[serde(serialize_with = "serialize_round4")]
    pub tflops: f64,
    /// Whether the row holds a trustworthy measurement
    #[serde(deserialize_with = "deserialize_flag")]
    pub ok: bool,
}

impl ResultRow {
    /// Build a row from a configuration and its metrics
    ///
    /// `ok` is cleared when the latency is not a usable measurement, whatever
    /// `process_ok` says.
    #[must_use]
    pub fn new(
        index: usize,
        tag: &str,
        config: &ConvConfig,
        metrics: &DerivedMetrics,
        process_ok: bool,
    ) -> Self {
        Self {
            index,
            tag: tag.to_string(),
            name: config.name(),
            batch: config.n(),
            h: config.h(),
            w: config.w(),
            c: config.c(),
            p: config.p(),
            q: config.q(),
            f: config.f(),
            s: config.s(),
            input_dtype: config.input_dtype().to_string(),
            output_dtype: config.output_dtype().to_string(),
            mean_microseconds: metrics.latency_us,
            arithmetic_intensity: metrics.arithmetic_intensity,
            tflops: metrics.tflops,
            ok: process_ok && metrics.latency_valid,
        }
    }
}

fn serialize_round4<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round4(*value))
}

/// Accepts `true`/`false` as well as Python's `True`/`False`
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "true" | "True" | "TRUE" | "1" => Ok(true),
        "false" | "False" | "FALSE" | "0" => Ok(false),
        other => Err(de::Error::custom(format!("invalid ok flag: {other:?}"))),
    }
}

/// Ordered collection of result rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row for `config`, assigning the next index
    pub fn push(&mut self, tag: &str, config: &ConvConfig, metrics: &DerivedMetrics, process_ok: bool) {
        let index = self.rows.len();
        self.rows
            .push(ResultRow::new(index, tag, config, metrics, process_ok));
    }

    /// Rows in order
    #[must_use]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows flagged `ok`
    #[must_use]
    pub fn ok_count(&self) -> usize {
        self.rows.iter().filter(|r| r.ok).count()
    }

    /// Write the table, replacing any existing file
    ///
    /// The parent directory is created if needed.
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the directory cannot be created and `CsvError` if
    /// the file cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConvBenchError::io(parent, &e))?;
        }

        let csv_err = |reason: String| ConvBenchError::CsvError {
            path: path.display().to_string(),
            reason,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| csv_err(e.to_string()))?;
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| csv_err(e.to_string()))?;
        for row in &self.rows {
            writer.serialize(row).map_err(|e| csv_err(e.to_string()))?;
        }
        writer.flush().map_err(|e| csv_err(e.to_string()))?;
        Ok(())
    }

    /// Load a table written by [`ResultTable::write_csv`]
    ///
    /// Columns are matched by header name; extra columns are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CsvError` if the file is missing, unreadable or lacks a
    /// required column.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let csv_err = |reason: String| ConvBenchError::CsvError {
            path: path.display().to_string(),
            reason,
        };

        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_err(e.to_string()))?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ResultRow>, _>>()
            .map_err(|e| csv_err(e.to_string()))?;
        Ok(Self { rows })
    }
}

impl FromIterator<ResultRow> for ResultTable {
    fn from_iter<I: IntoIterator<Item = ResultRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

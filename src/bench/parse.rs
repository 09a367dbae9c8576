//! Parser for the benchmark runner's console report
//!
//! The runner prints Google Benchmark style rows:
//!
//! ```text
//! Benchmark                                  Time             CPU   Iterations UserCounters...
//! BM_main/process_time/real_time          0.123 ms        0.145 ms         5000 items_per_second=8.1k/s
//! BM_main/process_time/real_time_mean     0.123 ms        0.145 ms            3 items_per_second=8.1k/s
//! BM_main/process_time/real_time_cv        0.81 %          0.69 %             3
//! ```
//!
//! This module is the only place that knows that format.

use thiserror::Error;

/// Why a report could not be turned into a latency
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No line looked like a benchmark row
    #[error("no benchmark rows in runner output")]
    NoBenchmarkRows,
    /// Rows were found, but none was the `_mean` aggregate
    #[error("runner output has {rows} benchmark rows but no _mean aggregate")]
    MissingMean {
        /// Number of rows that did parse
        rows: usize,
    },
}

/// Statistic an aggregate row carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Arithmetic mean over repetitions
    Mean,
    /// Median over repetitions
    Median,
    /// Standard deviation over repetitions
    Stddev,
    /// Coefficient of variation (reported in percent)
    Cv,
}

impl Aggregate {
    fn from_name(name: &str) -> Option<Self> {
        if name.ends_with("_mean") {
            Some(Self::Mean)
        } else if name.ends_with("_median") {
            Some(Self::Median)
        } else if name.ends_with("_stddev") {
            Some(Self::Stddev)
        } else if name.ends_with("_cv") {
            Some(Self::Cv)
        } else {
            None
        }
    }
}

/// One parsed row of the report
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkEntry {
    /// Benchmark name as printed
    pub name: String,
    /// Wall-clock time; milliseconds, or percent for `_cv` rows
    pub real_time: f64,
    /// CPU time in the same unit as `real_time`
    pub cpu_time: f64,
    /// Iteration count (repetition count for aggregates)
    pub iterations: u64,
    /// Trailing `key=value` counters
    pub counters: Vec<String>,
    /// Set for `_mean` / `_median` / `_stddev` / `_cv` rows
    pub aggregate: Option<Aggregate>,
}

/// All rows of one runner report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkSummary {
    /// Rows in print order
    pub entries: Vec<BenchmarkEntry>,
}

impl BenchmarkSummary {
    /// Rows that are individual repetitions
    pub fn repetitions(&self) -> impl Iterator<Item = &BenchmarkEntry> {
        self.entries.iter().filter(|e| e.aggregate.is_none())
    }

    /// First row carrying the given statistic
    #[must_use]
    pub fn aggregate(&self, kind: Aggregate) -> Option<&BenchmarkEntry> {
        self.entries.iter().find(|e| e.aggregate == Some(kind))
    }

    /// Mean wall-clock time in milliseconds
    ///
    /// # Errors
    ///
    /// Returns `MissingMean` if the report has no `_mean` row.
    pub fn mean_ms(&self) -> Result<f64, ParseError> {
        self.aggregate(Aggregate::Mean)
            .map(|e| e.real_time)
            .ok_or(ParseError::MissingMean {
                rows: self.entries.len(),
            })
    }
}

/// Milliseconds per unit, or `None` for `%` and unknown units
fn unit_to_ms(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1e-6),
        "us" | "µs" => Some(1e-3),
        "ms" => Some(1.0),
        "s" => Some(1e3),
        _ => None,
    }
}

fn parse_line(line: &str) -> Option<BenchmarkEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }
    let name = fields[0];
    let real: f64 = fields[1].parse().ok()?;
    let cpu: f64 = fields[3].parse().ok()?;
    let iterations: u64 = fields[5].parse().ok()?;
    let aggregate = Aggregate::from_name(name);

    let (real_time, cpu_time) = if aggregate == Some(Aggregate::Cv) {
        if fields[2] != "%" || fields[4] != "%" {
            return None;
        }
        (real, cpu)
    } else {
        (real * unit_to_ms(fields[2])?, cpu * unit_to_ms(fields[4])?)
    };

    Some(BenchmarkEntry {
        name: name.to_string(),
        real_time,
        cpu_time,
        iterations,
        counters: fields[6..].iter().map(|s| (*s).to_string()).collect(),
        aggregate,
    })
}

/// Parse every benchmark row out of the runner's output
///
/// Banner, context and separator lines are skipped.
///
/// # Errors
///
/// Returns `NoBenchmarkRows` if nothing in `output` is a benchmark row.
pub fn parse_output(output: &str) -> Result<BenchmarkSummary, ParseError> {
    let entries: Vec<BenchmarkEntry> = output.lines().filter_map(parse_line).collect();
    if entries.is_empty() {
        return Err(ParseError::NoBenchmarkRows);
    }
    Ok(BenchmarkSummary { entries })
}

/// Mean wall-clock time of the benchmarked function, in milliseconds
///
/// # Errors
///
/// Propagates [`ParseError`] when the output has no rows or no mean row.
pub fn mean_time_ms(output: &str) -> Result<f64, ParseError> {
    parse_output(output)?.mean_ms()
}

//! Output formatting
//!
//! - [`csv`]: per-benchmark reports and the steady-state bandwidth series
//! - [`json`]: run manifest
//! - [`text`]: console tables

pub mod csv;
pub mod json;
pub mod text;

pub use self::csv::{read_report, ReportWriter};
pub use self::json::{BenchmarkSummary, FailedPoint, RunManifest};

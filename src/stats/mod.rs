//! Raw result documents
//!
//! One document is written by the load generator per repetition. This module turns
//! it into per-direction metrics:
//!
//! - **JSON output**: `jobs[].read|write` with byte counts, runtime in milliseconds
//!   and latencies in nanoseconds
//! - **Terse v3 output**: one `;`-separated line per job group, byte counts in KiB,
//!   latencies in microseconds, percentile cells written as `p%=value`
//!
//! Latencies are normalized to whole microseconds (truncating) on the way in.
//!
//! # Example
//!
//! ```
//! use zbdsweep::stats::RawResultDocument;
//!
//! let idle = r#"{"jobs": [{"read": {"io_bytes": 0, "runtime": 0, "lat_ns": {"mean": 0.0}},
//!     "write": {"io_bytes": 0, "runtime": 0, "lat_ns": {"mean": 0.0}}}]}"#;
//! let metrics = RawResultDocument::new("run.log", idle).parse().unwrap();
//! assert_eq!(metrics.read.io_bytes, 0);
//!
//! assert!(RawResultDocument::new("cut.log", "{\"jobs\": [").parse().is_err());
//! ```

pub mod aggregator;
pub mod sampler;

use crate::error::SweepError;
use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::Path;

pub use aggregator::{AggregatedRecord, ResultAggregator};
pub use sampler::DiskStatsSampler;

/// Latency percentiles carried through the pipeline, in report order
pub const PERCENTILES: [f64; 18] = [
    1.0, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 99.0, 99.9, 99.99, 99.999,
    99.9999, 99.99999, 100.0,
];

/// Report column names for [`PERCENTILES`]
pub const PERCENTILE_LABELS: [&str; 18] = [
    "p1", "p5", "p10", "p20", "p30", "p40", "p50", "p60", "p70", "p80", "p90", "p99", "p99.9",
    "p99.99", "p99.999", "p99.9999", "p99.99999", "p100",
];

/// `--percentile_list` value requesting exactly [`PERCENTILES`]
pub fn percentile_list() -> String {
    PERCENTILE_LABELS
        .iter()
        .map(|label| label.trim_start_matches('p'))
        .collect::<Vec<_>>()
        .join(":")
}

fn percentile_slot(pct: f64) -> Option<usize> {
    PERCENTILES.iter().position(|p| (p - pct).abs() < 1e-6)
}

/// Measurements of one I/O direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionMetrics {
    pub io_bytes: u64,
    pub runtime_ms: u64,
    pub mean_latency_us: u64,
    pub percentiles_us: [u64; 18],
}

/// Measurements of one repetition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobMetrics {
    pub read: DirectionMetrics,
    pub write: DirectionMetrics,
}

/// Unparsed output of one repetition
#[derive(Debug, Clone)]
pub struct RawResultDocument {
    /// File name (or other label) used in warnings
    pub source_name: String,
    pub contents: String,
}

fn parse_failure(source: &str, reason: impl Into<String>) -> SweepError {
    SweepError::ParseFailure {
        source_name: source.to_string(),
        reason: reason.into(),
    }
}

impl RawResultDocument {
    pub fn new(source_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            contents: contents.into(),
        }
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read raw result {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, contents))
    }

    /// Extract metrics; the format is detected from the contents
    pub fn parse(&self) -> Result<JobMetrics, SweepError> {
        let terse: Vec<&str> = self.contents.lines().filter(|l| l.starts_with("3;")).collect();
        if !terse.is_empty() {
            return parse_terse(&self.source_name, &terse);
        }
        match self.contents.find('{') {
            Some(start) => parse_json(&self.source_name, &self.contents[start..]),
            None => Err(parse_failure(&self.source_name, "neither JSON nor terse v3 output")),
        }
    }
}

fn parse_json(source: &str, text: &str) -> Result<JobMetrics, SweepError> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| parse_failure(source, format!("invalid JSON: {}", e)))?;
    let jobs = root
        .get("jobs")
        .and_then(Value::as_array)
        .filter(|jobs| !jobs.is_empty())
        .ok_or_else(|| parse_failure(source, "no jobs in JSON output"))?;

    Ok(JobMetrics {
        read: json_direction(source, jobs, "read")?,
        write: json_direction(source, jobs, "write")?,
    })
}

/// Metrics of the first job that moved data in `direction`
///
/// With group reporting there is a single job; a reader and a writer job side by side
/// each contribute their own direction.
fn json_direction(source: &str, jobs: &[Value], direction: &str) -> Result<DirectionMetrics, SweepError> {
    let moved = |job: &&Value| {
        job.get(direction)
            .and_then(|d| d.get("io_bytes"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
            > 0
    };
    let job = jobs.iter().find(moved).unwrap_or(&jobs[0]);
    let section = job
        .get(direction)
        .ok_or_else(|| parse_failure(source, format!("job has no {} section", direction)))?;

    let field_u64 = |name: &str| {
        section
            .get(name)
            .and_then(Value::as_u64)
            .ok_or_else(|| parse_failure(source, format!("{}.{} missing", direction, name)))
    };
    let io_bytes = field_u64("io_bytes")?;
    let runtime_ms = field_u64("runtime")?;

    let mean_ns = section
        .get("lat_ns")
        .and_then(|l| l.get("mean"))
        .and_then(Value::as_f64)
        .ok_or_else(|| parse_failure(source, format!("{}.lat_ns.mean missing", direction)))?;

    let mut percentiles_us = [0u64; 18];
    match section
        .get("clat_ns")
        .and_then(|c| c.get("percentile"))
        .and_then(Value::as_object)
    {
        Some(map) => {
            let mut found = 0;
            for (key, value) in map {
                let slot = key.parse::<f64>().ok().and_then(percentile_slot);
                if let (Some(slot), Some(ns)) = (slot, value.as_u64()) {
                    percentiles_us[slot] = ns / 1000;
                    found += 1;
                }
            }
            if found < PERCENTILES.len() && io_bytes > 0 {
                return Err(parse_failure(
                    source,
                    format!("{} percentiles incomplete ({} of {})", direction, found, PERCENTILES.len()),
                ));
            }
        }
        None if io_bytes > 0 => {
            return Err(parse_failure(source, format!("{}.clat_ns.percentile missing", direction)));
        }
        None => {}
    }

    Ok(DirectionMetrics {
        io_bytes,
        runtime_ms,
        mean_latency_us: (mean_ns.max(0.0) as u64) / 1000,
        percentiles_us,
    })
}

// Terse v3 field positions; the write block repeats the read block 41 fields later
const TERSE_READ_KB: usize = 5;
const TERSE_READ_RUNTIME_MS: usize = 8;
const TERSE_READ_CLAT_PCT_FIRST: usize = 17;
const TERSE_PCT_SLOTS: usize = 20;
const TERSE_READ_LAT_MEAN_US: usize = 39;
const TERSE_WRITE_OFFSET: usize = 41;

/// One line per job group; like the JSON form, each direction comes from the first
/// line that moved data in it
fn parse_terse(source: &str, lines: &[&str]) -> Result<JobMetrics, SweepError> {
    let needed = TERSE_READ_LAT_MEAN_US + TERSE_WRITE_OFFSET + 1;
    let mut rows: Vec<Vec<&str>> = Vec::with_capacity(lines.len());
    for line in lines {
        let fields: Vec<&str> = line.trim().split(';').collect();
        if fields.len() < needed {
            return Err(parse_failure(
                source,
                format!("terse line has {} fields, expected at least {}", fields.len(), needed),
            ));
        }
        rows.push(fields);
    }

    Ok(JobMetrics {
        read: terse_direction(source, terse_row(&rows, 0), 0)?,
        write: terse_direction(source, terse_row(&rows, TERSE_WRITE_OFFSET), TERSE_WRITE_OFFSET)?,
    })
}

/// First row with a non-zero KiB total at `offset`, else the first row
fn terse_row<'a>(rows: &'a [Vec<&'a str>], offset: usize) -> &'a [&'a str] {
    rows.iter()
        .find(|fields| {
            fields[TERSE_READ_KB + offset]
                .trim()
                .parse::<u64>()
                .map(|kib| kib > 0)
                .unwrap_or(false)
        })
        .unwrap_or(&rows[0])
}

fn terse_direction(source: &str, fields: &[&str], offset: usize) -> Result<DirectionMetrics, SweepError> {
    let integer = |idx: usize| {
        fields[idx + offset]
            .trim()
            .parse::<u64>()
            .map_err(|_| parse_failure(source, format!("terse field {} is not an integer", idx + offset)))
    };
    let kib = integer(TERSE_READ_KB)?;
    let runtime_ms = integer(TERSE_READ_RUNTIME_MS)?;
    let mean_us: f64 = fields[TERSE_READ_LAT_MEAN_US + offset]
        .trim()
        .parse()
        .map_err(|_| parse_failure(source, "terse mean latency is not a number"))?;

    let mut percentiles_us = [0u64; 18];
    let mut found = 0;
    let first = TERSE_READ_CLAT_PCT_FIRST + offset;
    for cell in &fields[first..first + TERSE_PCT_SLOTS] {
        let Some((pct, value)) = cell.split_once("%=") else {
            continue;
        };
        let slot = pct.trim().parse::<f64>().ok().and_then(percentile_slot);
        if let (Some(slot), Ok(us)) = (slot, value.trim().parse::<u64>()) {
            percentiles_us[slot] = us;
            found += 1;
        }
    }
    if found < PERCENTILES.len() && kib > 0 {
        return Err(parse_failure(
            source,
            format!("terse percentiles incomplete ({} of {})", found, PERCENTILES.len()),
        ));
    }

    Ok(DirectionMetrics {
        io_bytes: kib * 1024,
        runtime_ms,
        mean_latency_us: mean_us.max(0.0) as u64,
        percentiles_us,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_percentile_list() {
        assert_eq!(
            percentile_list(),
            "1:5:10:20:30:40:50:60:70:80:90:99:99.9:99.99:99.999:99.9999:99.99999:100"
        );
    }

    #[test]
    fn test_parse_json() {
        let doc = RawResultDocument::new("a.log", fio_json(0, 8 * 1024 * 1024, 2000, 123_456.7));
        let metrics = doc.parse().unwrap();

        assert_eq!(metrics.write.io_bytes, 8 * 1024 * 1024);
        assert_eq!(metrics.write.runtime_ms, 2000);
        assert_eq!(metrics.write.mean_latency_us, 123);
        assert_eq!(metrics.write.percentiles_us[0], 123);
        assert_eq!(metrics.write.percentiles_us[17], 140);
        assert_eq!(metrics.read, DirectionMetrics::default());
    }

    #[test]
    fn test_parse_json_with_leading_noise() {
        let contents = format!("fio: note: zonemode=zbd\n{}", fio_json(4096, 0, 10, 5000.0));
        let metrics = RawResultDocument::new("a.log", contents).parse().unwrap();
        assert_eq!(metrics.read.io_bytes, 4096);
    }

    #[test]
    fn test_parse_json_split_jobs() {
        // Reader and writer reported separately
        let text = r#"{"jobs": [
            {"jobname": "writer", "read": {"io_bytes": 0, "runtime": 0, "lat_ns": {"mean": 0.0}},
             "write": {"io_bytes": 1000, "runtime": 500, "lat_ns": {"mean": 90000.0}}},
            {"jobname": "reader", "read": {"io_bytes": 2000, "runtime": 400, "lat_ns": {"mean": 2500.0}},
             "write": {"io_bytes": 0, "runtime": 0, "lat_ns": {"mean": 0.0}}}
        ]}"#;
        let err = RawResultDocument::new("mix.log", text).parse().unwrap_err();
        // Percentiles are required for directions that moved data
        assert!(matches!(err, SweepError::ParseFailure { .. }));

        let full = fio_json(2000, 0, 400, 2500.0);
        let metrics = RawResultDocument::new("mix.log", full).parse().unwrap();
        assert_eq!(metrics.read.mean_latency_us, 2);
    }

    #[test]
    fn test_parse_terse() {
        let doc = RawResultDocument::new("t.log", fio_terse_read(1000, 250, 87.9));
        let metrics = doc.parse().unwrap();

        assert_eq!(metrics.read.io_bytes, 1000 * 1024);
        assert_eq!(metrics.read.runtime_ms, 250);
        assert_eq!(metrics.read.mean_latency_us, 87);
        assert_eq!(metrics.read.percentiles_us[0], 100);
        assert_eq!(metrics.read.percentiles_us[17], 270);
        assert_eq!(metrics.write.io_bytes, 0);
    }

    #[test]
    fn test_parse_terse_writer_then_reader() {
        // rate-limited mixed point: writer group line first, reader group second
        let contents = format!("{}\n{}\n", fio_terse_write(50_000, 1000, 30.0), fio_terse_read(40_000, 1000, 250.0));
        let metrics = RawResultDocument::new("mix.log", contents).parse().unwrap();

        assert_eq!(metrics.read.io_bytes, 40_000 * 1024);
        assert_eq!(metrics.read.mean_latency_us, 250);
        assert_eq!(metrics.read.percentiles_us[0], 100);
        assert_eq!(metrics.write.io_bytes, 50_000 * 1024);
        assert_eq!(metrics.write.mean_latency_us, 30);
    }

    #[test]
    fn test_parse_terse_idle_lines() {
        let contents = format!("{}\n{}\n", fio_terse_read(0, 0, 0.0), fio_terse_read(0, 0, 0.0));
        let metrics = RawResultDocument::new("idle.log", contents).parse().unwrap();
        assert_eq!(metrics.read, DirectionMetrics::default());
        assert_eq!(metrics.write, DirectionMetrics::default());
    }

    #[test]
    fn test_truncated_documents_fail() {
        let full = fio_json(4096, 0, 10, 5000.0);
        let truncated = &full[..full.len() / 2];
        let err = RawResultDocument::new("cut.log", truncated).parse().unwrap_err();
        assert!(matches!(err, SweepError::ParseFailure { ref source_name, .. } if source_name == "cut.log"));

        let terse = fio_terse_read(1000, 250, 87.9);
        assert!(RawResultDocument::new("cut.log", &terse[..60]).parse().is_err());
        assert!(RawResultDocument::new("empty.log", "").parse().is_err());
        assert!(RawResultDocument::new("nojobs.log", "{\"jobs\": []}").parse().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("00-read-0001-0001-000004096-001of001.log");
        fs::write(&path, fio_json(4096, 0, 10, 5000.0)).unwrap();

        let doc = RawResultDocument::from_file(&path).unwrap();
        assert_eq!(doc.source_name, "00-read-0001-0001-000004096-001of001.log");
        assert!(doc.parse().is_ok());
        assert!(RawResultDocument::from_file(&dir.path().join("missing.log")).is_err());
    }
}

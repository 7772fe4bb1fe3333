//! CSV report output
//!
//! One report per benchmark, one row per [`AggregatedRecord`] in plan order.
//! Fixed columns:
//!
//! ```text
//! operation,parallelism,queue_depth,block_size,mean_latency_us,throughput_bytes_per_sec,p1,...,p100
//! ```
//!
//! Rate-limited records (mixed load) get an extra leading `write_rate_bytes_per_sec`
//! column. Writing always replaces the previous report at the same path.

use crate::error::SweepError;
use crate::plan::{Operation, PointKey};
use crate::stats::{AggregatedRecord, PERCENTILE_LABELS};
use crate::Result;
use anyhow::Context;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Leading column of rate-limited reports
pub const RATE_COLUMN: &str = "write_rate_bytes_per_sec";

const FIXED_COLUMNS: [&str; 6] = [
    "operation",
    "parallelism",
    "queue_depth",
    "block_size",
    "mean_latency_us",
    "throughput_bytes_per_sec",
];

/// Header line for a report, with or without the rate column
pub fn header(with_rate: bool) -> String {
    let mut columns: Vec<&str> = Vec::with_capacity(25);
    if with_rate {
        columns.push(RATE_COLUMN);
    }
    columns.extend(FIXED_COLUMNS);
    columns.extend(PERCENTILE_LABELS);
    columns.join(",")
}

fn row(record: &AggregatedRecord, with_rate: bool) -> String {
    let mut cells: Vec<String> = Vec::with_capacity(25);
    if with_rate {
        cells.push(record.key.write_rate_limit.unwrap_or(0).to_string());
    }
    cells.push(record.key.operation.fio_name().to_string());
    cells.push(record.key.parallelism.to_string());
    cells.push(record.key.queue_depth.to_string());
    cells.push(record.key.block_size.to_string());
    cells.push(record.mean_latency_us.to_string());
    cells.push(record.throughput_bytes_per_sec.to_string());
    cells.extend(record.percentiles_us.iter().map(u64::to_string));
    cells.join(",")
}

/// Writes benchmark reports
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the report with `records`; returns the report path
    pub fn write(&self, records: &[AggregatedRecord]) -> Result<PathBuf> {
        let with_rate = records.iter().any(|r| r.key.write_rate_limit.is_some());

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create report {}", self.path.display()))?;
        let mut out = BufWriter::new(file);

        writeln!(out, "{}", header(with_rate))?;
        for record in records {
            writeln!(out, "{}", row(record, with_rate))?;
        }
        out.flush()
            .with_context(|| format!("Failed to write report {}", self.path.display()))?;

        Ok(self.path.clone())
    }
}

fn bad_report(path: &Path, line: usize, reason: impl Into<String>) -> anyhow::Error {
    SweepError::ParseFailure {
        source_name: format!("{}:{}", path.display(), line),
        reason: reason.into(),
    }
    .into()
}

/// Parse a report back into records
///
/// The report does not carry repetition counts; `repetitions` is 0 in every record.
pub fn read_report(path: &Path) -> Result<Vec<AggregatedRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    let mut lines = text.lines();

    let with_rate = match lines.next() {
        Some(h) if h == header(true) => true,
        Some(h) if h == header(false) => false,
        _ => return Err(bad_report(path, 1, "unrecognized header")),
    };
    let offset = usize::from(with_rate);

    let mut records = Vec::new();
    for (i, line) in lines.enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let line_no = i + 2;
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != 24 + offset {
            return Err(bad_report(path, line_no, format!("expected {} columns, got {}", 24 + offset, cells.len())));
        }

        let num = |idx: usize| -> Result<u64> {
            cells[idx]
                .parse::<u64>()
                .map_err(|_| bad_report(path, line_no, format!("bad number '{}'", cells[idx])))
        };

        let operation: Operation = cells[offset]
            .parse()
            .map_err(|_| bad_report(path, line_no, format!("unknown operation '{}'", cells[offset])))?;
        let write_rate_limit = if with_rate {
            Some(num(0)?).filter(|&rate| rate > 0)
        } else {
            None
        };

        let mut percentiles_us = [0u64; 18];
        for (slot, value) in percentiles_us.iter_mut().enumerate() {
            *value = num(offset + 6 + slot)?;
        }

        records.push(AggregatedRecord {
            key: PointKey {
                operation,
                parallelism: num(offset + 1)? as u32,
                queue_depth: num(offset + 2)? as u32,
                block_size: num(offset + 3)?,
                write_rate_limit,
            },
            mean_latency_us: num(offset + 4)?,
            throughput_bytes_per_sec: num(offset + 5)?,
            percentiles_us,
            repetitions: 0,
        });
    }

    Ok(records)
}

/// Write bandwidth time series of the steady-state benchmark
pub fn write_bandwidth_series(path: &Path, series: &[crate::stats::sampler::BandwidthPoint]) -> Result<PathBuf> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "time_sec,write_bw_kib")?;
    for point in series {
        writeln!(out, "{},{}", point.time_sec, point.write_kib_per_sec)?;
    }
    out.flush()?;
    Ok(path.to_path_buf())
}

/// Write bandwidth per slice of written data (zone write benchmark)
pub fn write_written_series(path: &Path, series: &[crate::stats::sampler::WrittenPoint]) -> Result<PathBuf> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "written_gb,write_avg_mbs")?;
    for point in series {
        writeln!(out, "{},{}", point.written_gib, point.write_mib_per_sec)?;
    }
    out.flush()?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::sampler::BandwidthPoint;
    use tempfile::TempDir;

    fn record(operation: Operation, parallelism: u32, rate: Option<u64>, base: u64) -> AggregatedRecord {
        let mut percentiles_us = [0u64; 18];
        for (i, p) in percentiles_us.iter_mut().enumerate() {
            *p = base + i as u64;
        }
        AggregatedRecord {
            key: PointKey {
                operation,
                parallelism,
                queue_depth: parallelism * 2,
                block_size: 4096,
                write_rate_limit: rate,
            },
            mean_latency_us: base,
            throughput_bytes_per_sec: base * 1_000_000,
            percentiles_us,
            repetitions: 0,
        }
    }

    #[test]
    fn test_header_columns() {
        let h = header(false);
        let cols: Vec<&str> = h.split(',').collect();
        assert_eq!(cols.len(), 24);
        assert_eq!(cols[0], "operation");
        assert_eq!(cols[5], "throughput_bytes_per_sec");
        assert_eq!(cols[6], "p1");
        assert_eq!(cols[23], "p100");
        assert!(header(true).starts_with("write_rate_bytes_per_sec,operation,"));
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let records = vec![
            record(Operation::SequentialRead, 1, None, 80),
            record(Operation::RandomRead, 4, None, 120),
            record(Operation::SequentialWrite, 8, None, 300),
        ];

        let path = ReportWriter::new(dir.path().join("report.csv")).write(&records).unwrap();
        assert_eq!(read_report(&path).unwrap(), records);
    }

    #[test]
    fn test_rate_column_round_trip() {
        let dir = TempDir::new().unwrap();
        let records = vec![
            record(Operation::MixedReadWrite, 1, Some(25 << 20), 90),
            record(Operation::MixedReadWrite, 1, Some(50 << 20), 140),
        ];

        let path = ReportWriter::new(dir.path().join("mixed.csv")).write(&records).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("26214400,randrw,1,2,4096,90,"));
        assert_eq!(read_report(&path).unwrap(), records);
    }

    #[test]
    fn test_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().join("report.csv"));
        writer
            .write(&[record(Operation::SequentialRead, 1, None, 1), record(Operation::SequentialRead, 2, None, 2)])
            .unwrap();
        writer.write(&[record(Operation::RandomRead, 1, None, 5)]).unwrap();

        let records = read_report(writer.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.operation, Operation::RandomRead);
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().join("missing").join("report.csv"));
        assert!(writer.write(&[]).is_err());
    }

    #[test]
    fn test_rejects_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, format!("{}\nread,1,1\n", header(false))).unwrap();
        assert!(read_report(&path).is_err());

        fs::write(&path, "not,a,report\n").unwrap();
        assert!(read_report(&path).is_err());
    }

    #[test]
    fn test_bandwidth_series_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bw.csv");
        write_bandwidth_series(
            &path,
            &[
                BandwidthPoint { time_sec: 10, write_kib_per_sec: 512_000 },
                BandwidthPoint { time_sec: 20, write_kib_per_sec: 498_000 },
            ],
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "time_sec,write_bw_kib\n10,512000\n20,498000\n"
        );
    }
}

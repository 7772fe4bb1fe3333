//! Passive disk statistics sampler
//!
//! Polls `/proc/diskstats` for the target device on a background thread while a single
//! workload runs, appending one CSV row per sample. The sampler is started right before
//! the load generator and stopped right after it; it never spans two points and does
//! not touch aggregation state.

use crate::Result;
use anyhow::Context;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const SECTOR_BYTES: u64 = 512;
const LOG_HEADER: &str = "elapsed_ms,reads_completed,sectors_read,writes_completed,sectors_written";

/// Cumulative counters of one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStatsSample {
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
}

/// Counters for `device` from a diskstats table, `None` if the device is not listed
pub fn read_sample(diskstats: &Path, device: &str) -> Result<Option<DiskStatsSample>> {
    let table = fs::read_to_string(diskstats)
        .with_context(|| format!("Failed to read {}", diskstats.display()))?;

    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || fields[2] != device {
            continue;
        }
        let num = |i: usize| fields[i].parse::<u64>().unwrap_or(0);
        return Ok(Some(DiskStatsSample {
            reads_completed: num(3),
            sectors_read: num(5),
            writes_completed: num(7),
            sectors_written: num(9),
        }));
    }
    Ok(None)
}

/// Samples one device at a fixed interval
#[derive(Debug, Clone)]
pub struct DiskStatsSampler {
    diskstats: PathBuf,
    device: String,
    interval: Duration,
}

impl DiskStatsSampler {
    pub fn new(diskstats: impl Into<PathBuf>, device: impl Into<String>, interval: Duration) -> Self {
        Self {
            diskstats: diskstats.into(),
            device: device.into(),
            interval,
        }
    }

    /// Start sampling into `log_path` (overwritten)
    pub fn start(&self, log_path: &Path) -> Result<SamplerHandle> {
        let file = File::create(log_path)
            .with_context(|| format!("Failed to create sampler log {}", log_path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", LOG_HEADER)?;

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let sampler = self.clone();
        let started = Instant::now();

        let thread = std::thread::Builder::new()
            .name("diskstats-sampler".to_string())
            .spawn(move || -> Result<u64> {
                let mut rows = 0u64;
                loop {
                    let stop = match stop_rx.recv_timeout(sampler.interval) {
                        Err(RecvTimeoutError::Timeout) => false,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    };

                    match read_sample(&sampler.diskstats, &sampler.device) {
                        Ok(Some(s)) => {
                            writeln!(
                                out,
                                "{},{},{},{},{}",
                                started.elapsed().as_millis(),
                                s.reads_completed,
                                s.sectors_read,
                                s.writes_completed,
                                s.sectors_written
                            )?;
                            out.flush()?;
                            rows += 1;
                        }
                        Ok(None) => {
                            tracing::debug!(device = %sampler.device, "device not listed in diskstats");
                        }
                        Err(e) => tracing::warn!("diskstats sample failed: {:#}", e),
                    }

                    if stop {
                        return Ok(rows);
                    }
                }
            })
            .context("Failed to spawn diskstats sampler")?;

        Ok(SamplerHandle {
            stop: stop_tx,
            thread,
        })
    }
}

/// Running sampler; [`SamplerHandle::stop`] takes a final sample and joins the thread
pub struct SamplerHandle {
    stop: Sender<()>,
    thread: JoinHandle<Result<u64>>,
}

impl SamplerHandle {
    /// Stop sampling; returns the number of rows written
    pub fn stop(self) -> Result<u64> {
        // A disconnected receiver means the thread already ended; join reports why
        let _ = self.stop.send(());
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("diskstats sampler panicked"))?
    }
}

/// Write bandwidth between consecutive samples of a sampler log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthPoint {
    /// Seconds since the sampler started, at the end of the interval
    pub time_sec: u64,
    pub write_kib_per_sec: u64,
}

/// Derive the write bandwidth time series from a sampler log
pub fn write_bandwidth_series(log_path: &Path) -> Result<Vec<BandwidthPoint>> {
    let text = fs::read_to_string(log_path)
        .with_context(|| format!("Failed to read sampler log {}", log_path.display()))?;

    let rows: Vec<(u64, u64)> = text
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split(',').collect();
            if cols.len() != 5 {
                return None;
            }
            Some((cols[0].parse().ok()?, cols[4].parse().ok()?))
        })
        .collect();

    Ok(rows
        .windows(2)
        .filter(|w| w[1].0 > w[0].0)
        .map(|w| {
            let (t0, s0) = w[0];
            let (t1, s1) = w[1];
            let bytes = s1.saturating_sub(s0) * SECTOR_BYTES;
            BandwidthPoint {
                time_sec: t1 / 1000,
                write_kib_per_sec: bytes * 1000 / (t1 - t0) / 1024,
            }
        })
        .collect())
}

/// Mean write bandwidth over one slice of the bytes written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenPoint {
    /// GiB written before the slice starts
    pub written_gib: u64,
    pub write_mib_per_sec: u64,
}

/// Average a bandwidth series over consecutive `bucket_gib` GiB slices of written data
///
/// A slice closes with the sample that carries the total past its end; a trailing
/// partial slice is kept.
pub fn written_series(series: &[BandwidthPoint], bucket_gib: u64) -> Vec<WrittenPoint> {
    let bucket_gib = bucket_gib.max(1);
    let bucket_bytes = u128::from(bucket_gib) << 30;

    let mut points = Vec::new();
    let mut written: u128 = 0;
    let mut previous_sec = 0;
    let (mut sum, mut samples) = (0u64, 0u64);

    for point in series {
        let elapsed = point.time_sec.saturating_sub(previous_sec);
        previous_sec = point.time_sec;
        written += u128::from(point.write_kib_per_sec) * 1024 * u128::from(elapsed);
        sum += point.write_kib_per_sec;
        samples += 1;

        if written >= bucket_bytes * (points.len() as u128 + 1) {
            points.push(WrittenPoint {
                written_gib: points.len() as u64 * bucket_gib,
                write_mib_per_sec: sum / samples / 1024,
            });
            sum = 0;
            samples = 0;
        }
    }
    if samples > 0 {
        points.push(WrittenPoint {
            written_gib: points.len() as u64 * bucket_gib,
            write_mib_per_sec: sum / samples / 1024,
        });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn diskstats_line(name: &str, sectors_written: u64) -> String {
        format!(
            " 259       1 {} 1200 0 96000 300 {} 0 {} 800 0 900 1100 0 0 0 0\n",
            name,
            sectors_written / 8,
            sectors_written
        )
    }

    #[test]
    fn test_read_sample() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diskstats");
        fs::write(
            &path,
            format!("{}{}", diskstats_line("nvme0n1", 80), diskstats_line("nvme0n2", 1600)),
        )
        .unwrap();

        let sample = read_sample(&path, "nvme0n2").unwrap().unwrap();
        assert_eq!(sample.sectors_written, 1600);
        assert_eq!(sample.writes_completed, 200);
        assert_eq!(sample.reads_completed, 1200);
        assert_eq!(sample.sectors_read, 96000);
        assert!(read_sample(&path, "sda").unwrap().is_none());
    }

    #[test]
    fn test_sampler_writes_log() {
        let dir = TempDir::new().unwrap();
        let stats = dir.path().join("diskstats");
        let log = dir.path().join("point.diskstats.csv");
        fs::write(&stats, diskstats_line("nvme0n2", 0)).unwrap();

        let sampler = DiskStatsSampler::new(&stats, "nvme0n2", Duration::from_millis(5));
        let handle = sampler.start(&log).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        fs::write(&stats, diskstats_line("nvme0n2", 4096)).unwrap();
        let rows = handle.stop().unwrap();

        assert!(rows >= 1);
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.starts_with(LOG_HEADER));
        assert_eq!(text.lines().count() as u64, rows + 1);
        assert!(text.lines().last().unwrap().ends_with(",4096"));
    }

    #[test]
    fn test_bandwidth_series() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log.csv");
        fs::write(
            &log,
            format!(
                "{}\n0,0,0,0,0\n10000,0,0,10,204800\n20000,0,0,20,614400\n",
                LOG_HEADER
            ),
        )
        .unwrap();

        let series = write_bandwidth_series(&log).unwrap();
        assert_eq!(
            series,
            vec![
                BandwidthPoint { time_sec: 10, write_kib_per_sec: 10240 },
                BandwidthPoint { time_sec: 20, write_kib_per_sec: 20480 },
            ]
        );
    }

    #[test]
    fn test_written_series_slices() {
        let gib_per_sec = 1024 * 1024;
        let mut series: Vec<BandwidthPoint> = (1..=6)
            .map(|t| BandwidthPoint { time_sec: t, write_kib_per_sec: gib_per_sec })
            .collect();
        series.extend((7..=12).map(|t| BandwidthPoint { time_sec: t, write_kib_per_sec: gib_per_sec / 2 }));

        let slices = written_series(&series, 6);
        assert_eq!(
            slices,
            vec![
                WrittenPoint { written_gib: 0, write_mib_per_sec: 1024 },
                WrittenPoint { written_gib: 6, write_mib_per_sec: 512 },
            ]
        );
        assert!(written_series(&[], 6).is_empty());
    }
}

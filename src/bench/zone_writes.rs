//! Write bandwidth as the device is written over
//!
//! Resets the device, then runs random writes that cover the usable capacity several
//! times in one untimed point. Disk statistics are sampled every second; the report
//! averages the write bandwidth over consecutive slices of the data written, which
//! shows where garbage collection starts to cost throughput.

use super::{report_path, Benchmark};
use crate::config::{ExecutionContext, SweepConfig, ZoneWritesConfig};
use crate::device::DeviceProfile;
use crate::output::csv::write_written_series;
use crate::output::ReportWriter;
use crate::plan::{Operation, SweepAxes, SweepPlanner, WorkloadPoint};
use crate::stats::sampler::written_series;
use crate::stats::AggregatedRecord;
use crate::Result;
use std::path::{Path, PathBuf};

pub const ID: &str = "fio_zone_writes";

const SAMPLE_INTERVAL_MS: u64 = 1000;

pub struct ZoneWrites {
    config: ZoneWritesConfig,
    capacity_fraction: f64,
}

impl ZoneWrites {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            config: config.zone_writes.clone(),
            capacity_fraction: config.device.capacity_fraction,
        }
    }

    /// Writer count, capped by the zone count and the open-zone limit
    fn jobs(&self, profile: &DeviceProfile) -> u32 {
        let mut jobs = self.config.jobs.max(1);
        if profile.is_zoned {
            if profile.has_open_zone_limit() {
                jobs = jobs.min(profile.max_open_zones);
            }
            jobs = jobs.min(u32::try_from(profile.zone_count).unwrap_or(u32::MAX)).max(1);
        }
        if jobs != self.config.jobs {
            tracing::debug!(configured = self.config.jobs, jobs, "zone writers capped");
        }
        jobs
    }
}

impl Benchmark for ZoneWrites {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Write bandwidth while random writes cover the device several times"
    }

    fn context(&self, base: &ExecutionContext) -> ExecutionContext {
        let mut ctx = base
            .clone()
            .with_timing(0, 0)
            .with_sampling(true)
            .with_write_passes(self.config.passes);
        ctx.sample_interval_ms = SAMPLE_INTERVAL_MS;
        ctx
    }

    fn plan(&self, profile: &DeviceProfile) -> Vec<WorkloadPoint> {
        let jobs = self.jobs(profile);
        let axes = SweepAxes {
            operations: vec![Operation::RandomWrite],
            parallelism_levels: vec![jobs],
            queue_depths: vec![jobs],
            block_sizes: vec![self.config.block_size],
            repetitions_per_point: 1,
            target_bytes_per_point: u64::MAX,
            parallel_random_read: false,
        };
        SweepPlanner::new(axes, profile.clone())
            .with_capacity_fraction(self.capacity_fraction)
            .expand(Operation::RandomWrite, jobs, jobs, self.config.block_size, None)
    }

    /// `<id>.csv` holds the bandwidth per written slice, `<id>_records.csv` the
    /// averaged point record
    fn report(&self, records: &[AggregatedRecord], result_dir: &Path) -> Result<Vec<PathBuf>> {
        let series = super::steady_state::bandwidth_series(result_dir)?;
        if series.is_empty() {
            tracing::info!(dir = %result_dir.display(), "no disk-stats logs, written series is empty");
        }
        let slices = written_series(&series, u64::from(self.config.passes));

        let mut written = vec![write_written_series(&report_path(ID, result_dir), &slices)?];
        let records_path = result_dir.join(format!("{}_records.csv", ID));
        written.push(ReportWriter::new(records_path).write(records)?);
        Ok(written)
    }
}

//! Steady-state write performance
//!
//! Fills the whole device sequentially, then keeps overwriting it with random writes
//! for a fixed number of passes. No reset happens between the fill and the passes,
//! so the device reaches its sustained (garbage-collecting) state. Disk statistics
//! are sampled throughout and turned into a write bandwidth time series.

use super::{report_path, Benchmark};
use crate::config::{ExecutionContext, SteadyStateConfig, SweepConfig};
use crate::device::DeviceProfile;
use crate::output::csv::write_bandwidth_series;
use crate::output::ReportWriter;
use crate::plan::{Operation, PointKind, ResetPolicy, SweepAxes, SweepPlanner, WorkloadPoint};
use crate::stats::sampler::{self, BandwidthPoint};
use crate::stats::AggregatedRecord;
use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};

pub const ID: &str = "fio_steady_state_performance";

const DISKSTATS_SUFFIX: &str = ".diskstats.csv";

pub struct SteadyState {
    config: SteadyStateConfig,
    capacity_fraction: f64,
}

impl SteadyState {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            config: config.steady_state.clone(),
            capacity_fraction: config.device.capacity_fraction,
        }
    }

    /// Job count, capped at one job per zone
    fn jobs(&self, profile: &DeviceProfile) -> u32 {
        let jobs = self.config.jobs.max(1);
        if profile.is_zoned && u64::from(jobs) > profile.zone_count {
            let capped = u32::try_from(profile.zone_count).unwrap_or(u32::MAX).max(1);
            tracing::warn!(jobs, zones = profile.zone_count, "more jobs than zones, running with {} jobs", capped);
            capped
        } else {
            jobs
        }
    }
}

impl Benchmark for SteadyState {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Sustained random-write bandwidth after a full device fill"
    }

    fn context(&self, base: &ExecutionContext) -> ExecutionContext {
        base.clone().with_timing(0, 0).with_sampling(true)
    }

    fn plan(&self, profile: &DeviceProfile) -> Vec<WorkloadPoint> {
        let jobs = self.jobs(profile);
        let axes = SweepAxes {
            operations: vec![Operation::RandomWrite],
            parallelism_levels: vec![jobs],
            queue_depths: vec![jobs],
            block_sizes: vec![self.config.block_size],
            repetitions_per_point: self.config.passes,
            target_bytes_per_point: u64::MAX,
            parallel_random_read: false,
        };
        let planner = SweepPlanner::new(axes, profile.clone()).with_capacity_fraction(self.capacity_fraction);
        let increment = planner.increment_bytes(jobs);

        let fill = WorkloadPoint {
            kind: PointKind::Prep {
                target: Operation::RandomWrite,
            },
            operation: Operation::SequentialWrite,
            parallelism: jobs,
            queue_depth: jobs,
            block_size: self.config.block_size,
            repetition_index: 1,
            repetition_count: 1,
            size_bytes: increment,
            offset_increment_bytes: increment,
            reset: ResetPolicy::BeforeRun,
            write_rate_limit: None,
        };

        let passes = planner
            .expand(Operation::RandomWrite, jobs, jobs, self.config.block_size, None)
            .into_iter()
            .map(|mut pass| {
                pass.reset = ResetPolicy::Preserve;
                pass
            });

        std::iter::once(fill).chain(passes).collect()
    }

    fn report(&self, records: &[AggregatedRecord], result_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = vec![ReportWriter::new(report_path(ID, result_dir)).write(records)?];

        let series = bandwidth_series(result_dir)?;
        if series.is_empty() {
            tracing::info!(dir = %result_dir.display(), "no disk-stats logs, skipping bandwidth series");
        } else {
            let path = result_dir.join(format!("{}_bw.csv", ID));
            written.push(write_bandwidth_series(&path, &series)?);
        }
        Ok(written)
    }
}

/// Bandwidth series over all sampler logs of a run, in log order, on one time axis
pub fn bandwidth_series(result_dir: &Path) -> Result<Vec<BandwidthPoint>> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(result_dir)
        .with_context(|| format!("Failed to list {}", result_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().ends_with(DISKSTATS_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    logs.sort();

    let mut series = Vec::new();
    let mut offset = 0;
    for log in logs {
        let points = sampler::write_bandwidth_series(&log)?;
        let end = points.last().map(|p| p.time_sec).unwrap_or(0);
        series.extend(points.into_iter().map(|p| BandwidthPoint {
            time_sec: p.time_sec + offset,
            ..p
        }));
        offset += end;
    }
    Ok(series)
}

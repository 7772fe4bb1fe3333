//! Read and write phases over one fill
//!
//! After a full sequential fill the device runs four timed phases back to back,
//! without a reset in between:
//!
//! 1. 4 KiB random reads, one reader per share of the device
//! 2. 128 KiB sequential reads
//! 3. 128 KiB mixed random reads and writes (70% reads)
//! 4. 128 KiB sequential writes over the filled device
//!
//! Every phase reports its latency percentiles; the report keeps phase order.

use super::{report_path, Benchmark};
use crate::config::{ExecutionContext, PhasesConfig, SweepConfig};
use crate::device::DeviceProfile;
use crate::output::ReportWriter;
use crate::plan::{Operation, ResetPolicy, SweepAxes, SweepPlanner, WorkloadPoint};
use crate::stats::AggregatedRecord;
use crate::Result;
use std::path::{Path, PathBuf};

pub const ID: &str = "fio_zone_randr_seqw_seqr_rrsw";

/// Phase order
pub const PHASES: [Operation; 4] = [
    Operation::RandomRead,
    Operation::SequentialRead,
    Operation::MixedReadWrite,
    Operation::SequentialWrite,
];

fn phase_rank(operation: Operation) -> usize {
    PHASES.iter().position(|&op| op == operation).unwrap_or(PHASES.len())
}

pub struct PhasedLoad {
    config: PhasesConfig,
    capacity_fraction: f64,
}

impl PhasedLoad {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            config: config.phases.clone(),
            capacity_fraction: config.device.capacity_fraction,
        }
    }

    /// At most one job per zone
    fn cap_jobs(profile: &DeviceProfile, jobs: u32) -> u32 {
        if profile.is_zoned {
            jobs.min(u32::try_from(profile.zone_count).unwrap_or(u32::MAX)).max(1)
        } else {
            jobs.max(1)
        }
    }
}

impl Benchmark for PhasedLoad {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Random read, sequential read, 70/30 mixed and sequential write phases after a fill"
    }

    fn context(&self, base: &ExecutionContext) -> ExecutionContext {
        let mut ctx = base
            .clone()
            .with_timing(self.config.ramp_time_secs, self.config.runtime_secs);
        ctx.mixed_writer.rwmixread = self.config.rwmixread;
        ctx
    }

    fn plan(&self, profile: &DeviceProfile) -> Vec<WorkloadPoint> {
        let depth = self.config.queue_depth.max(1);
        let axes = SweepAxes {
            operations: PHASES.to_vec(),
            parallelism_levels: vec![1],
            queue_depths: vec![depth],
            block_sizes: vec![self.config.block_size],
            repetitions_per_point: 1,
            target_bytes_per_point: u64::MAX,
            parallel_random_read: true,
        };
        let planner = SweepPlanner::new(axes, profile.clone()).with_capacity_fraction(self.capacity_fraction);

        let readers = Self::cap_jobs(profile, self.config.random_readers);
        let sequential_jobs = Self::cap_jobs(profile, depth);
        let bs = self.config.block_size;

        let mut points = vec![planner.prep_point(Operation::RandomRead)];
        points.extend(planner.expand(
            Operation::RandomRead,
            readers,
            readers * depth,
            self.config.random_read_block_size,
            None,
        ));
        points.extend(planner.expand(Operation::SequentialRead, 1, sequential_jobs, bs, None));
        points.extend(planner.expand(Operation::MixedReadWrite, 1, depth, bs, None));
        points.extend(
            planner
                .expand(Operation::SequentialWrite, sequential_jobs, sequential_jobs, bs, None)
                .into_iter()
                .map(|mut point| {
                    point.reset = ResetPolicy::Preserve;
                    point
                }),
        );
        points
    }

    /// Records in phase order, whatever order the raw logs were folded in
    fn report(&self, records: &[AggregatedRecord], result_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut ordered = records.to_vec();
        ordered.sort_by_key(|r| phase_rank(r.key.operation));
        let path = ReportWriter::new(report_path(ID, result_dir)).write(&ordered)?;
        Ok(vec![path])
    }
}

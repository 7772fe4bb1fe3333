//! Read latency under rate-limited writes
//!
//! After a full fill, every point runs random reads next to a random-write job
//! capped at one of the configured write rates. Rates are visited in ascending order
//! and the fill is kept across them.

use super::Benchmark;
use crate::config::{ExecutionContext, MixedConfig, SweepConfig};
use crate::device::checks::Scheduler;
use crate::device::DeviceProfile;
use crate::plan::{Operation, SweepAxes, SweepPlanner, WorkloadPoint};

pub const ID: &str = "fio_zone_mixed";

const MIB: u64 = 1024 * 1024;

pub struct MixedLoad {
    config: MixedConfig,
    repetitions: u32,
    capacity_fraction: f64,
}

impl MixedLoad {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            config: config.mixed.clone(),
            repetitions: config.sweep.repetitions,
            capacity_fraction: config.device.capacity_fraction,
        }
    }
}

impl Benchmark for MixedLoad {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Random read latency while random writes run at increasing rate limits"
    }

    fn preferred_scheduler(&self) -> Scheduler {
        Scheduler::MqDeadline
    }

    fn context(&self, base: &ExecutionContext) -> ExecutionContext {
        base.clone()
            .with_timing(self.config.ramp_time_secs, self.config.runtime_secs)
    }

    fn plan(&self, profile: &DeviceProfile) -> Vec<WorkloadPoint> {
        let axes = SweepAxes {
            operations: vec![Operation::MixedReadWrite],
            parallelism_levels: vec![1],
            queue_depths: vec![self.config.read_queue_depth],
            block_sizes: vec![self.config.read_block_size],
            repetitions_per_point: self.repetitions,
            target_bytes_per_point: u64::MAX,
            parallel_random_read: false,
        };
        let planner = SweepPlanner::new(axes, profile.clone()).with_capacity_fraction(self.capacity_fraction);

        let mut rates = self.config.write_rates_mib.clone();
        rates.sort_unstable();
        rates.dedup();

        let mut points = vec![planner.prep_point(Operation::MixedReadWrite)];
        for rate in rates {
            points.extend(planner.expand(
                Operation::MixedReadWrite,
                1,
                self.config.read_queue_depth,
                self.config.read_block_size,
                Some(rate * MIB),
            ));
        }
        points
    }
}

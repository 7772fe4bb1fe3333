//! Throughput and average latency sweep
//!
//! The full planner sweep: operations x parallelism x queue depth x block size, with
//! a fill ahead of every read operation.

use super::Benchmark;
use crate::config::{ExecutionContext, SweepConfig};
use crate::device::DeviceProfile;
use crate::plan::{SweepAxes, SweepPlanner, WorkloadPoint};

pub const ID: &str = "fio_zone_throughput_avg_lat";

pub struct ThroughputSweep {
    axes: SweepAxes,
    capacity_fraction: f64,
    runtime_secs: u64,
    ramp_time_secs: u64,
}

impl ThroughputSweep {
    pub fn new(config: &SweepConfig) -> Self {
        Self {
            axes: config.sweep.axes(),
            capacity_fraction: config.device.capacity_fraction,
            runtime_secs: config.sweep.runtime_secs,
            ramp_time_secs: config.sweep.ramp_time_secs,
        }
    }

    pub fn planner(&self, profile: &DeviceProfile) -> SweepPlanner {
        SweepPlanner::new(self.axes.clone(), profile.clone()).with_capacity_fraction(self.capacity_fraction)
    }
}

impl Benchmark for ThroughputSweep {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Throughput and latency sweep over operation, jobs, queue depth and block size"
    }

    fn context(&self, base: &ExecutionContext) -> ExecutionContext {
        base.clone().with_timing(self.ramp_time_secs, self.runtime_secs)
    }

    fn plan(&self, profile: &DeviceProfile) -> Vec<WorkloadPoint> {
        self.planner(profile).plan().collect()
    }
}

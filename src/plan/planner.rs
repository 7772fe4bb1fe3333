//! Sweep planner
//!
//! Expands the cartesian product `operations × parallelism × queue depth × block size`
//! (in that nesting order) into workload points, pruning combinations the device
//! cannot serve. Operations that read get a fill point ahead of their first
//! measured point.
//!
//! The plan is produced lazily, one operation at a time; calling
//! [`SweepPlanner::plan`] again yields a fresh sequence.

use super::{job_count, Operation, PointKind, ResetPolicy, SweepAxes, WorkloadPoint};
use crate::device::DeviceProfile;
use std::collections::VecDeque;
use std::fmt;

/// Transfer size of fill points
pub const PREP_BLOCK_SIZE: u64 = 128 * 1024;

/// Why a candidate point was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ParallelismExceedsQueueDepth,
    /// The synchronous engine ties one queue slot to one job
    WriteQueueDepthExceedsParallelism,
    MoreJobsThanZones { jobs: u32, zones: u64 },
    InsufficientSpace { required: u128, usable: u64 },
}

impl SkipReason {
    /// Capacity skips are worth an operator's attention, shape rules are not
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            SkipReason::MoreJobsThanZones { .. } | SkipReason::InsufficientSpace { .. }
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ParallelismExceedsQueueDepth => write!(f, "parallelism exceeds queue depth"),
            SkipReason::WriteQueueDepthExceedsParallelism => {
                write!(f, "queue depth exceeds parallelism for a write operation")
            }
            SkipReason::MoreJobsThanZones { jobs, zones } => {
                write!(f, "{} jobs need more zones than the {} available", jobs, zones)
            }
            SkipReason::InsufficientSpace { required, usable } => {
                write!(f, "insufficient space: {} bytes needed, {} usable", required, usable)
            }
        }
    }
}

/// Builds workload points for one device
#[derive(Debug, Clone)]
pub struct SweepPlanner {
    axes: SweepAxes,
    profile: DeviceProfile,
    /// Share of a conventional device used for fill plus measurement
    capacity_fraction: f64,
}

impl SweepPlanner {
    pub fn new(axes: SweepAxes, profile: DeviceProfile) -> Self {
        Self {
            axes,
            profile,
            capacity_fraction: 1.0,
        }
    }

    pub fn with_capacity_fraction(mut self, fraction: f64) -> Self {
        self.capacity_fraction = fraction;
        self
    }

    pub fn axes(&self) -> &SweepAxes {
        &self.axes
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn usable_capacity(&self) -> u64 {
        self.profile.usable_capacity(self.capacity_fraction)
    }

    /// Start-offset stride between consecutive jobs
    ///
    /// Zoned devices hand each job a whole number of zones; conventional devices
    /// split the usable range evenly.
    pub fn increment_bytes(&self, jobs: u32) -> u64 {
        let jobs = u64::from(jobs.max(1));
        if self.profile.is_zoned {
            (self.profile.zone_count / jobs) * self.profile.zone_size_bytes
        } else {
            self.usable_capacity() / jobs
        }
    }

    /// Writable bytes inside one job's increment
    fn job_capacity(&self, jobs: u32) -> u64 {
        let jobs = u64::from(jobs.max(1));
        if self.profile.is_zoned {
            (self.profile.zone_count / jobs) * self.profile.zone_capacity_bytes
        } else {
            self.usable_capacity() / jobs
        }
    }

    /// Parallelism levels actually swept for `operation`
    ///
    /// Reads measure a stable, previously filled region, so they run with a single
    /// parallel unit unless parallel random reads were asked for.
    pub fn parallelism_levels(&self, operation: Operation) -> Vec<u32> {
        let keep = !operation.requires_prefill()
            || (operation == Operation::RandomRead && self.axes.parallel_random_read);
        if keep {
            self.axes.parallelism_levels.clone()
        } else {
            vec![1]
        }
    }

    /// Pruning rules for one candidate
    pub fn check(&self, operation: Operation, parallelism: u32, queue_depth: u32) -> Result<(), SkipReason> {
        if parallelism > queue_depth {
            return Err(SkipReason::ParallelismExceedsQueueDepth);
        }
        if operation.is_write() && queue_depth > parallelism {
            return Err(SkipReason::WriteQueueDepthExceedsParallelism);
        }

        let jobs = job_count(operation, parallelism, queue_depth);
        if self.profile.is_zoned && u64::from(jobs) > self.profile.zone_count {
            return Err(SkipReason::MoreJobsThanZones {
                jobs,
                zones: self.profile.zone_count,
            });
        }

        let required = u128::from(jobs) * u128::from(self.axes.target_bytes_per_point);
        let usable = self.usable_capacity();
        if required > u128::from(usable) {
            return Err(SkipReason::InsufficientSpace { required, usable });
        }
        Ok(())
    }

    /// Repetitions of one surviving combination
    pub fn expand(
        &self,
        operation: Operation,
        parallelism: u32,
        queue_depth: u32,
        block_size: u64,
        write_rate_limit: Option<u64>,
    ) -> Vec<WorkloadPoint> {
        let jobs = job_count(operation, parallelism, queue_depth);
        let size_bytes = self.axes.target_bytes_per_point.min(self.job_capacity(jobs));
        let reset = if operation.is_write() {
            ResetPolicy::BeforeRun
        } else {
            ResetPolicy::Preserve
        };
        let count = self.axes.repetitions_per_point.max(1);

        (1..=count)
            .map(|repetition_index| WorkloadPoint {
                kind: PointKind::Measured,
                operation,
                parallelism,
                queue_depth,
                block_size,
                repetition_index,
                repetition_count: count,
                size_bytes,
                offset_increment_bytes: self.increment_bytes(jobs),
                reset,
                write_rate_limit,
            })
            .collect()
    }

    /// Sequential fill of the whole usable region ahead of `target`
    pub fn prep_point(&self, target: Operation) -> WorkloadPoint {
        let jobs = if self.profile.is_zoned && self.profile.zone_count < 2 {
            1
        } else {
            2
        };
        let increment = self.increment_bytes(jobs);

        WorkloadPoint {
            kind: PointKind::Prep { target },
            operation: Operation::SequentialWrite,
            parallelism: jobs,
            queue_depth: jobs,
            block_size: PREP_BLOCK_SIZE,
            repetition_index: 1,
            repetition_count: 1,
            size_bytes: increment,
            offset_increment_bytes: increment,
            reset: ResetPolicy::BeforeRun,
            write_rate_limit: None,
        }
    }

    /// Measured points for one operation, in plan order
    fn measured_points(&self, operation: Operation) -> Vec<WorkloadPoint> {
        let mut points = Vec::new();
        for parallelism in self.parallelism_levels(operation) {
            for &queue_depth in &self.axes.queue_depths {
                if let Err(reason) = self.check(operation, parallelism, queue_depth) {
                    if reason.is_capacity() {
                        tracing::warn!(
                            operation = %operation,
                            parallelism,
                            queue_depth,
                            "skipping point: {}",
                            reason
                        );
                    } else {
                        tracing::debug!(
                            operation = %operation,
                            parallelism,
                            queue_depth,
                            "pruned: {}",
                            reason
                        );
                    }
                    continue;
                }
                for &block_size in &self.axes.block_sizes {
                    points.extend(self.expand(operation, parallelism, queue_depth, block_size, None));
                }
            }
        }
        points
    }

    /// Lazy plan over all configured operations
    pub fn plan(&self) -> PlanIter<'_> {
        PlanIter {
            planner: self,
            next_operation: 0,
            pending: VecDeque::new(),
        }
    }
}

/// Iterator over the points of one plan
pub struct PlanIter<'a> {
    planner: &'a SweepPlanner,
    next_operation: usize,
    /// Points of the operation being emitted
    pending: VecDeque<WorkloadPoint>,
}

impl<'a> PlanIter<'a> {
    fn load(&mut self, operation: Operation) {
        let measured = self.planner.measured_points(operation);
        if measured.is_empty() {
            tracing::warn!(operation = %operation, "no points remain after pruning; operation omitted");
            return;
        }
        if operation.requires_prefill() {
            self.pending.push_back(self.planner.prep_point(operation));
        }
        self.pending.extend(measured);
    }
}

impl<'a> Iterator for PlanIter<'a> {
    type Item = WorkloadPoint;

    fn next(&mut self) -> Option<WorkloadPoint> {
        loop {
            if let Some(point) = self.pending.pop_front() {
                return Some(point);
            }
            let operation = *self.planner.axes.operations.get(self.next_operation)?;
            self.next_operation += 1;
            self.load(operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    fn axes(operations: Vec<Operation>, parallelism: Vec<u32>, queue_depths: Vec<u32>) -> SweepAxes {
        SweepAxes {
            operations,
            parallelism_levels: parallelism,
            queue_depths,
            block_sizes: vec![4096, 131072],
            repetitions_per_point: 2,
            target_bytes_per_point: GIB,
            parallel_random_read: false,
        }
    }

    fn zoned_64() -> DeviceProfile {
        DeviceProfile::zoned("/dev/nvme0n2", 64, GIB, GIB, 14, 4096).unwrap()
    }

    fn combos(points: &[WorkloadPoint]) -> Vec<(u32, u32)> {
        let mut c: Vec<(u32, u32)> = points
            .iter()
            .filter(|p| !p.is_prep())
            .map(|p| (p.parallelism, p.queue_depth))
            .collect();
        c.dedup();
        c
    }

    #[test]
    fn test_zoned_scenario() {
        let planner = SweepPlanner::new(
            axes(vec![Operation::SequentialWrite], vec![1, 8, 16], vec![1, 8, 16]),
            zoned_64(),
        );
        let points: Vec<_> = planner.plan().collect();
        let kept = combos(&points);

        assert!(!kept.contains(&(16, 1)));
        assert!(kept.contains(&(8, 8)));
        assert_eq!(kept, vec![(1, 1), (8, 8), (16, 16)]);
        // 3 combos x 2 block sizes x 2 repetitions
        assert_eq!(points.len(), 12);
    }

    #[test]
    fn test_max_open_zones_not_pruned() {
        // 16 jobs exceed the 14 open zones; the limit is enforced at invocation time
        let planner = SweepPlanner::new(
            axes(vec![Operation::RandomWrite], vec![16], vec![16]),
            zoned_64(),
        );
        assert_eq!(planner.plan().count(), 4);
    }

    #[test]
    fn test_emitted_points_respect_limits() {
        let planner = SweepPlanner::new(
            axes(Operation::ALL.to_vec(), vec![1, 2, 4, 8, 16, 32, 64], vec![1, 2, 4, 8, 16, 32, 64, 128]),
            DeviceProfile::zoned("/dev/nvme0n2", 32, GIB, GIB / 2, 14, 4096).unwrap(),
        );
        let usable = planner.usable_capacity();
        let target = planner.axes().target_bytes_per_point;

        for point in planner.plan().filter(|p| !p.is_prep()) {
            assert!(point.parallelism <= point.queue_depth, "{:?}", point);
            assert!(u64::from(point.parallelism) * target <= usable, "{:?}", point);
            assert!(u64::from(point.job_count()) * target <= usable, "{:?}", point);
        }
    }

    #[test]
    fn test_prep_precedes_reads() {
        let planner = SweepPlanner::new(
            axes(
                vec![Operation::SequentialRead, Operation::RandomRead, Operation::SequentialWrite],
                vec![1, 4],
                vec![1, 4],
            ),
            zoned_64(),
        );
        let points: Vec<_> = planner.plan().collect();

        for op in [Operation::SequentialRead, Operation::RandomRead] {
            let prep = points
                .iter()
                .position(|p| p.kind == PointKind::Prep { target: op })
                .expect("prep point");
            let first = points
                .iter()
                .position(|p| !p.is_prep() && p.operation == op)
                .expect("measured point");
            assert!(prep < first);
        }

        // Writes do not get a prep point
        assert_eq!(points.iter().filter(|p| p.is_prep()).count(), 2);
    }

    #[test]
    fn test_prep_point_shape() {
        let planner = SweepPlanner::new(axes(vec![Operation::SequentialRead], vec![1], vec![1]), zoned_64());
        let prep = planner.prep_point(Operation::SequentialRead);

        assert_eq!(prep.operation, Operation::SequentialWrite);
        assert_eq!(prep.job_count(), 2);
        assert_eq!(prep.block_size, PREP_BLOCK_SIZE);
        assert_eq!(prep.size_bytes, 32 * GIB);
        assert_eq!(prep.offset_increment_bytes, 32 * GIB);
        assert!(prep.requires_reset());

        let single = SweepPlanner::new(
            axes(vec![Operation::SequentialRead], vec![1], vec![1]),
            DeviceProfile::zoned("/dev/nvme0n2", 1, GIB, GIB, 0, 4096).unwrap(),
        );
        assert_eq!(single.prep_point(Operation::SequentialRead).job_count(), 1);
    }

    #[test]
    fn test_reads_pinned_to_single_parallel_unit() {
        let mut a = axes(vec![Operation::RandomRead], vec![1, 4], vec![4]);
        let planner = SweepPlanner::new(a.clone(), zoned_64());
        assert!(planner.plan().filter(|p| !p.is_prep()).all(|p| p.parallelism == 1));

        a.parallel_random_read = true;
        let planner = SweepPlanner::new(a, zoned_64());
        let levels: Vec<u32> = planner.plan().filter(|p| !p.is_prep()).map(|p| p.parallelism).collect();
        assert!(levels.contains(&4));
    }

    #[test]
    fn test_conventional_increment() {
        let profile = DeviceProfile::conventional("/dev/nvme0n1", 1_000_000_000_000, 512);
        let planner = SweepPlanner::new(axes(vec![Operation::RandomWrite], vec![16], vec![16]), profile);

        let first: Vec<_> = planner.plan().collect();
        let second: Vec<_> = planner.plan().collect();
        assert_eq!(first, second);

        let expected = planner.usable_capacity() / 16;
        assert_eq!(expected, 62_500_000_000);
        for point in &first {
            assert_eq!(point.offset_increment_bytes, expected);
            assert_eq!(point.size_bytes, GIB);
        }
    }

    #[test]
    fn test_capacity_fraction() {
        let profile = DeviceProfile::conventional("/dev/nvme0n1", 16 * GIB, 512);
        let planner = SweepPlanner::new(axes(vec![Operation::RandomWrite], vec![8, 16], vec![8, 16]), profile)
            .with_capacity_fraction(0.5);

        assert_eq!(planner.usable_capacity(), 8 * GIB);
        // 16 jobs x 1 GiB no longer fit
        assert_eq!(combos(&planner.plan().collect::<Vec<_>>()), vec![(8, 8)]);
    }

    #[test]
    fn test_fully_pruned_operation_omitted() {
        let profile = DeviceProfile::conventional("/dev/nvme0n1", GIB / 2, 512);
        let planner = SweepPlanner::new(
            axes(vec![Operation::SequentialRead, Operation::SequentialWrite], vec![1], vec![1]),
            profile,
        );
        // Nothing fits, and no prep point is emitted for the read either
        assert_eq!(planner.plan().count(), 0);
    }

    #[test]
    fn test_reset_policy() {
        let planner = SweepPlanner::new(
            axes(vec![Operation::RandomRead, Operation::RandomWrite], vec![1], vec![1]),
            zoned_64(),
        );
        for point in planner.plan() {
            match (point.kind, point.operation) {
                (PointKind::Prep { .. }, _) => assert!(point.requires_reset()),
                (_, Operation::RandomWrite) => assert!(point.requires_reset()),
                _ => assert!(!point.requires_reset()),
            }
        }
    }

    #[test]
    fn test_repetitions_numbered() {
        let planner = SweepPlanner::new(axes(vec![Operation::SequentialWrite], vec![1], vec![1]), zoned_64());
        let reps: Vec<(u32, u32)> = planner
            .plan()
            .filter(|p| p.block_size == 4096)
            .map(|p| (p.repetition_index, p.repetition_count))
            .collect();
        assert_eq!(reps, vec![(1, 2), (2, 2)]);
    }
}

//! Sweep planning
//!
//! Turns a declared sweep (the cartesian product of [`SweepAxes`]) into an ordered
//! sequence of concrete [`WorkloadPoint`]s that respect device limits.
//!
//! - [`planner`]: the [`SweepPlanner`] and its lazy [`PlanIter`]
//! - [`naming`]: deterministic raw-result file names, and parsing them back

pub mod naming;
pub mod planner;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use naming::ResultFileName;
pub use planner::{PlanIter, SweepPlanner};

/// Workload operation type
///
/// Declaration order is the canonical sweep order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    #[serde(alias = "read")]
    SequentialRead,
    #[serde(alias = "randread")]
    RandomRead,
    #[serde(alias = "write")]
    SequentialWrite,
    #[serde(alias = "randwrite")]
    RandomWrite,
    #[serde(alias = "randrw")]
    MixedReadWrite,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::SequentialRead,
        Operation::RandomRead,
        Operation::SequentialWrite,
        Operation::RandomWrite,
        Operation::MixedReadWrite,
    ];

    /// Load generator `rw=` value, also used in file names and reports
    pub fn fio_name(&self) -> &'static str {
        match self {
            Operation::SequentialRead => "read",
            Operation::RandomRead => "randread",
            Operation::SequentialWrite => "write",
            Operation::RandomWrite => "randwrite",
            Operation::MixedReadWrite => "randrw",
        }
    }

    /// Position in the canonical order
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Reads a region that must have been filled beforehand
    pub fn requires_prefill(&self) -> bool {
        matches!(
            self,
            Operation::SequentialRead | Operation::RandomRead | Operation::MixedReadWrite
        )
    }

    /// Pure write workloads; these start from a reset device
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::SequentialWrite | Operation::RandomWrite)
    }

    /// Sequential operations run on the synchronous engine, one queue slot per job
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Operation::SequentialRead | Operation::SequentialWrite)
    }

    pub fn is_random(&self) -> bool {
        matches!(
            self,
            Operation::RandomRead | Operation::RandomWrite | Operation::MixedReadWrite
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fio_name())
    }
}

impl FromStr for Operation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Operation::ALL
            .iter()
            .copied()
            .find(|op| {
                op.fio_name() == lower
                    || serde_json::to_value(op)
                        .ok()
                        .and_then(|v| v.as_str().map(|name| name == lower))
                        .unwrap_or(false)
            })
            .ok_or_else(|| anyhow::anyhow!("unknown operation: {}", s))
    }
}

/// Declared sweep: ordered axis values plus per-point sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepAxes {
    pub operations: Vec<Operation>,
    pub parallelism_levels: Vec<u32>,
    pub queue_depths: Vec<u32>,
    /// Transfer sizes in bytes
    pub block_sizes: Vec<u64>,
    /// At least 1
    pub repetitions_per_point: u32,
    /// Workload size per job, independent of the axis values
    pub target_bytes_per_point: u64,
    /// Random reads keep their parallelism levels instead of being pinned to 1
    #[serde(default)]
    pub parallel_random_read: bool,
}

impl SweepAxes {
    /// Canonical form: operations in canonical order, numeric axes ascending, no duplicates
    ///
    /// With normalized axes the plan order and the sorted raw-file listing agree.
    pub fn normalized(mut self) -> Self {
        self.operations.sort();
        self.operations.dedup();
        self.parallelism_levels.sort_unstable();
        self.parallelism_levels.dedup();
        self.queue_depths.sort_unstable();
        self.queue_depths.dedup();
        self.block_sizes.sort_unstable();
        self.block_sizes.dedup();
        self
    }
}

/// Role of a point in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Full sequential fill ahead of `target`, an operation that reads
    Prep { target: Operation },
    /// Measured repetition
    Measured,
}

/// Whether the executor resets the device before running the point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    BeforeRun,
    /// Keep the data written by earlier points
    Preserve,
}

/// One planned unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadPoint {
    pub kind: PointKind,
    pub operation: Operation,
    pub parallelism: u32,
    pub queue_depth: u32,
    pub block_size: u64,
    /// 1-based
    pub repetition_index: u32,
    pub repetition_count: u32,
    /// Bytes each job transfers
    pub size_bytes: u64,
    /// Distance between the start offsets of consecutive jobs
    pub offset_increment_bytes: u64,
    pub reset: ResetPolicy,
    /// Write-direction rate limit in bytes/sec (mixed load only)
    pub write_rate_limit: Option<u64>,
}

impl WorkloadPoint {
    pub fn is_prep(&self) -> bool {
        matches!(self.kind, PointKind::Prep { .. })
    }

    pub fn requires_reset(&self) -> bool {
        self.reset == ResetPolicy::BeforeRun
    }

    /// Number of jobs the load generator runs for this point
    pub fn job_count(&self) -> u32 {
        job_count(self.operation, self.parallelism, self.queue_depth)
    }

    /// Outstanding I/Os per job
    pub fn per_job_depth(&self) -> u32 {
        if self.operation.is_synchronous() {
            1
        } else {
            (self.queue_depth / self.parallelism.max(1)).max(1)
        }
    }

    /// Aggregation key shared by all repetitions of this point
    pub fn key(&self) -> PointKey {
        PointKey {
            operation: self.operation,
            parallelism: self.parallelism,
            queue_depth: self.queue_depth,
            block_size: self.block_size,
            write_rate_limit: self.write_rate_limit,
        }
    }

    pub fn file_name(&self) -> ResultFileName {
        ResultFileName::for_point(self)
    }
}

/// Jobs for an operation: one per queue slot on the synchronous engine, one per
/// parallel unit on the queued engine
pub fn job_count(operation: Operation, parallelism: u32, queue_depth: u32) -> u32 {
    if operation.is_synchronous() {
        queue_depth.max(1)
    } else {
        parallelism.max(1)
    }
}

/// Identity of an aggregated record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointKey {
    pub operation: Operation,
    pub parallelism: u32,
    pub queue_depth: u32,
    pub block_size: u64,
    pub write_rate_limit: Option<u64>,
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} p={} qd={} bs={}",
            self.operation, self.parallelism, self.queue_depth, self.block_size
        )?;
        if let Some(rate) = self.write_rate_limit {
            write!(f, " write_rate={}B/s", rate)?;
        }
        Ok(())
    }
}

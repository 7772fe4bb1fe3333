//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! A [`SweepConfig`] is loaded (or defaulted), overridden by the CLI, validated, and
//! then turned into an [`ExecutionContext`] that is passed explicitly to every
//! component that touches the device or the load generator.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::plan::{Operation, SweepAxes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub sweep: SweepSection,
    #[serde(default)]
    pub steady_state: SteadyStateConfig,
    #[serde(default)]
    pub mixed: MixedConfig,
    #[serde(default)]
    pub zone_writes: ZoneWritesConfig,
    #[serde(default)]
    pub phases: PhasesConfig,
}

/// Target device and host metadata locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Block device, e.g. /dev/nvme0n2
    pub path: Option<PathBuf>,
    /// Share of a conventional device used for fill plus measurement (0, 1]
    #[serde(default = "default_capacity_fraction")]
    pub capacity_fraction: f64,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "default_mounts_table")]
    pub mounts_table: PathBuf,
    #[serde(default = "default_diskstats")]
    pub diskstats: PathBuf,
}

fn default_capacity_fraction() -> f64 {
    1.0
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys")
}

fn default_mounts_table() -> PathBuf {
    PathBuf::from("/proc/mounts")
}

fn default_diskstats() -> PathBuf {
    PathBuf::from("/proc/diskstats")
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity_fraction: default_capacity_fraction(),
            sysfs_root: default_sysfs_root(),
            mounts_table: default_mounts_table(),
            diskstats: default_diskstats(),
        }
    }
}

/// Where external tools run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerMode {
    /// Tools from the host's PATH
    #[default]
    System,
    /// Load generator inside a privileged container
    Docker,
}

impl fmt::Display for ContainerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerMode::System => write!(f, "system"),
            ContainerMode::Docker => write!(f, "docker"),
        }
    }
}

/// Raw result document format requested from the load generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Terse,
}

impl OutputFormat {
    pub fn fio_name(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Terse => "terse",
        }
    }
}

/// SPDK user-space driver setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpdkConfig {
    /// SPDK checkout; the fio plugin lives under `build/fio/spdk_bdev`
    pub path: PathBuf,
    /// Bdev configuration passed as `--spdk_json_conf`
    pub json_conf: PathBuf,
    /// Bdev name used as the fio filename
    #[serde(default = "default_spdk_bdev")]
    pub bdev: String,
}

fn default_spdk_bdev() -> String {
    "Uring0".to_string()
}

impl SpdkConfig {
    pub fn ioengine(&self) -> String {
        self.path.join("build/fio/spdk_bdev").display().to_string()
    }
}

/// How the load generator is run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub container: ContainerMode,
    #[serde(default = "default_container_engine")]
    pub container_engine: String,
    #[serde(default = "default_fio_image")]
    pub fio_image: String,
    #[serde(default = "default_fio_binary")]
    pub fio_binary: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Results root; each run gets a timestamped directory below it
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub spdk: Option<SpdkConfig>,
    /// Sample /proc/diskstats while every point runs
    #[serde(default)]
    pub sample_disk_stats: bool,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Plan and print without touching the device
    #[serde(default)]
    pub dry_run: bool,
}

fn default_container_engine() -> String {
    "docker".to_string()
}

fn default_fio_image() -> String {
    "zfio".to_string()
}

fn default_fio_binary() -> String {
    "fio".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_sample_interval_ms() -> u64 {
    10_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            container: ContainerMode::default(),
            container_engine: default_container_engine(),
            fio_image: default_fio_image(),
            fio_binary: default_fio_binary(),
            output_format: OutputFormat::default(),
            output_dir: default_output_dir(),
            spdk: None,
            sample_disk_stats: false,
            sample_interval_ms: default_sample_interval_ms(),
            dry_run: false,
        }
    }
}

/// Throughput/latency sweep axes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSection {
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,
    #[serde(default = "default_levels")]
    pub parallelism_levels: Vec<u32>,
    #[serde(default = "default_levels")]
    pub queue_depths: Vec<u32>,
    /// Bytes
    #[serde(default = "default_block_sizes")]
    pub block_sizes: Vec<u64>,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    /// Bytes per job
    #[serde(default = "default_target_bytes")]
    pub target_bytes: u64,
    #[serde(default)]
    pub parallel_random_read: bool,
    #[serde(default = "default_sweep_runtime")]
    pub runtime_secs: u64,
    #[serde(default = "default_sweep_ramp")]
    pub ramp_time_secs: u64,
}

fn default_operations() -> Vec<Operation> {
    vec![
        Operation::SequentialRead,
        Operation::RandomRead,
        Operation::SequentialWrite,
    ]
}

fn default_levels() -> Vec<u32> {
    vec![1, 2, 4, 8, 16, 32, 64, 128]
}

fn default_block_sizes() -> Vec<u64> {
    vec![4096, 8192, 16384, 32768, 65536, 131072]
}

fn default_repetitions() -> u32 {
    1
}

fn default_target_bytes() -> u64 {
    8 * 1024 * 1024 * 1024
}

fn default_sweep_runtime() -> u64 {
    30
}

fn default_sweep_ramp() -> u64 {
    15
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            operations: default_operations(),
            parallelism_levels: default_levels(),
            queue_depths: default_levels(),
            block_sizes: default_block_sizes(),
            repetitions: default_repetitions(),
            target_bytes: default_target_bytes(),
            parallel_random_read: false,
            runtime_secs: default_sweep_runtime(),
            ramp_time_secs: default_sweep_ramp(),
        }
    }
}

impl SweepSection {
    pub fn axes(&self) -> SweepAxes {
        SweepAxes {
            operations: self.operations.clone(),
            parallelism_levels: self.parallelism_levels.clone(),
            queue_depths: self.queue_depths.clone(),
            block_sizes: self.block_sizes.clone(),
            repetitions_per_point: self.repetitions,
            target_bytes_per_point: self.target_bytes,
            parallel_random_read: self.parallel_random_read,
        }
    }
}

/// Sustained random-write benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteadyStateConfig {
    #[serde(default = "default_steady_jobs")]
    pub jobs: u32,
    #[serde(default = "default_steady_block_size")]
    pub block_size: u64,
    /// Random-write passes over the filled device
    #[serde(default = "default_steady_passes")]
    pub passes: u32,
}

fn default_steady_jobs() -> u32 {
    16
}

fn default_steady_block_size() -> u64 {
    64 * 1024
}

fn default_steady_passes() -> u32 {
    2
}

impl Default for SteadyStateConfig {
    fn default() -> Self {
        Self {
            jobs: default_steady_jobs(),
            block_size: default_steady_block_size(),
            passes: default_steady_passes(),
        }
    }
}

/// Read latency under rate-limited writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixedConfig {
    /// Write rate targets in MiB/s
    #[serde(default = "default_write_rates")]
    pub write_rates_mib: Vec<u64>,
    #[serde(default = "default_mixed_read_block_size")]
    pub read_block_size: u64,
    #[serde(default = "default_mixed_read_depth")]
    pub read_queue_depth: u32,
    #[serde(default = "default_mixed_write_block_size")]
    pub write_block_size: u64,
    #[serde(default = "default_mixed_write_depth")]
    pub write_queue_depth: u32,
    /// Read share for unthrottled mixed points
    #[serde(default = "default_rwmixread")]
    pub rwmixread: u8,
    #[serde(default = "default_mixed_runtime")]
    pub runtime_secs: u64,
    #[serde(default = "default_mixed_ramp")]
    pub ramp_time_secs: u64,
}

fn default_write_rates() -> Vec<u64> {
    vec![
        25, 50, 75, 100, 125, 150, 175, 200, 300, 400, 500, 600, 700, 800, 900, 1000,
    ]
}

fn default_mixed_read_block_size() -> u64 {
    4096
}

fn default_mixed_read_depth() -> u32 {
    1
}

fn default_mixed_write_block_size() -> u64 {
    16 * 1024
}

fn default_mixed_write_depth() -> u32 {
    8
}

fn default_rwmixread() -> u8 {
    50
}

fn default_mixed_runtime() -> u64 {
    180
}

fn default_mixed_ramp() -> u64 {
    30
}

impl Default for MixedConfig {
    fn default() -> Self {
        Self {
            write_rates_mib: default_write_rates(),
            read_block_size: default_mixed_read_block_size(),
            read_queue_depth: default_mixed_read_depth(),
            write_block_size: default_mixed_write_block_size(),
            write_queue_depth: default_mixed_write_depth(),
            rwmixread: default_rwmixread(),
            runtime_secs: default_mixed_runtime(),
            ramp_time_secs: default_mixed_ramp(),
        }
    }
}

/// Write bandwidth over repeated whole-device random writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneWritesConfig {
    /// Concurrent writers; capped by the zone count and the open-zone limit
    #[serde(default = "default_zone_writes_jobs")]
    pub jobs: u32,
    #[serde(default = "default_steady_block_size")]
    pub block_size: u64,
    /// Times the device is written over
    #[serde(default = "default_zone_writes_passes")]
    pub passes: u32,
}

fn default_zone_writes_jobs() -> u32 {
    14
}

fn default_zone_writes_passes() -> u32 {
    6
}

impl Default for ZoneWritesConfig {
    fn default() -> Self {
        Self {
            jobs: default_zone_writes_jobs(),
            block_size: default_steady_block_size(),
            passes: default_zone_writes_passes(),
        }
    }
}

/// Random read, sequential read, mixed and sequential write phases over one fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesConfig {
    /// Outstanding I/Os per job in every phase
    #[serde(default = "default_phase_depth")]
    pub queue_depth: u32,
    /// Random-read jobs, each on its own share of the device
    #[serde(default = "default_phase_readers")]
    pub random_readers: u32,
    #[serde(default = "default_mixed_read_block_size")]
    pub random_read_block_size: u64,
    /// Block size of the sequential and mixed phases
    #[serde(default = "default_phase_block_size")]
    pub block_size: u64,
    #[serde(default = "default_phase_rwmixread")]
    pub rwmixread: u8,
    #[serde(default = "default_mixed_runtime")]
    pub runtime_secs: u64,
    #[serde(default = "default_mixed_ramp")]
    pub ramp_time_secs: u64,
}

fn default_phase_depth() -> u32 {
    64
}

fn default_phase_readers() -> u32 {
    4
}

fn default_phase_block_size() -> u64 {
    128 * 1024
}

fn default_phase_rwmixread() -> u8 {
    70
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_phase_depth(),
            random_readers: default_phase_readers(),
            random_read_block_size: default_mixed_read_block_size(),
            block_size: default_phase_block_size(),
            rwmixread: default_phase_rwmixread(),
            runtime_secs: default_mixed_runtime(),
            ramp_time_secs: default_mixed_ramp(),
        }
    }
}

/// Companion writer job of a rate-limited mixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedWriter {
    pub block_size: u64,
    pub queue_depth: u32,
    /// Read share when no write rate is set
    pub rwmixread: u8,
}

impl Default for MixedWriter {
    fn default() -> Self {
        Self {
            block_size: default_mixed_write_block_size(),
            queue_depth: default_mixed_write_depth(),
            rwmixread: default_rwmixread(),
        }
    }
}

/// Everything the executor needs to know about this run
///
/// Built once per benchmark; replaces any process-wide setting.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub device: PathBuf,
    /// Directory the raw logs of this benchmark go to
    pub result_dir: PathBuf,
    /// Run directory; mounted into the container, `result_dir` lies below it
    pub output_root: PathBuf,
    pub container: ContainerMode,
    pub fio_binary: String,
    pub output_format: OutputFormat,
    pub spdk: Option<SpdkConfig>,
    /// 0 disables time-based runs; points then run for their size
    pub runtime_secs: u64,
    pub ramp_time_secs: u64,
    pub mixed_writer: MixedWriter,
    pub sysfs_root: PathBuf,
    pub diskstats: PathBuf,
    pub sample_disk_stats: bool,
    pub sample_interval_ms: u64,
    /// Times a measured write job covers its region; above 1 sets `io_size`
    pub write_passes: u32,
}

impl ExecutionContext {
    pub fn new(config: &SweepConfig, device: &Path, result_dir: &Path) -> Self {
        Self {
            device: device.to_path_buf(),
            result_dir: result_dir.to_path_buf(),
            output_root: result_dir.to_path_buf(),
            container: config.execution.container,
            fio_binary: config.execution.fio_binary.clone(),
            output_format: config.execution.output_format,
            spdk: config.execution.spdk.clone(),
            runtime_secs: config.sweep.runtime_secs,
            ramp_time_secs: config.sweep.ramp_time_secs,
            mixed_writer: MixedWriter {
                block_size: config.mixed.write_block_size,
                queue_depth: config.mixed.write_queue_depth,
                rwmixread: config.mixed.rwmixread,
            },
            sysfs_root: config.device.sysfs_root.clone(),
            diskstats: config.device.diskstats.clone(),
            sample_disk_stats: config.execution.sample_disk_stats,
            sample_interval_ms: config.execution.sample_interval_ms,
            write_passes: 1,
        }
    }

    pub fn with_timing(mut self, ramp_time_secs: u64, runtime_secs: u64) -> Self {
        self.ramp_time_secs = ramp_time_secs;
        self.runtime_secs = runtime_secs;
        self
    }

    pub fn with_sampling(mut self, enabled: bool) -> Self {
        self.sample_disk_stats = enabled;
        self
    }

    pub fn with_write_passes(mut self, passes: u32) -> Self {
        self.write_passes = passes.max(1);
        self
    }

    pub fn is_time_based(&self) -> bool {
        self.runtime_secs > 0
    }
}

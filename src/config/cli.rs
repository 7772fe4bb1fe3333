//! CLI argument parsing using clap

use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;

/// Where external tools run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContainerArg {
    /// Use fio and friends installed on the host
    System,
    /// Run fio in a privileged docker container
    Docker,
}

/// Raw result format requested from fio
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Terse,
}

/// zbdsweep - fio sweeps for zoned and conventional block devices
#[derive(Parser, Debug)]
#[command(name = "zbdsweep")]
#[command(version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["dev", "report", "list_benchmarks"])
))]
pub struct Cli {
    /// Block device to benchmark (e.g., /dev/nvme0n2). All data on it is destroyed
    #[arg(short = 'd', long)]
    pub dev: Option<PathBuf>,

    /// Rebuild reports from an existing results directory without running anything
    #[arg(short = 'r', long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// List available benchmarks and exit
    #[arg(short = 'l', long)]
    pub list_benchmarks: bool,

    /// Run fio on the host or in a container
    #[arg(short = 'c', long, value_enum)]
    pub container: Option<ContainerArg>,

    /// Benchmarks to run (default: all)
    #[arg(short = 'b', long, num_args = 1..)]
    pub benchmarks: Vec<String>,

    /// Directory the zbdsweep_results tree is created in
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", env = "ZBDSWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// fio output format for raw results
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Repetitions per sweep point
    #[arg(long)]
    pub runs: Option<u32>,

    /// Per-job workload size for sweep points (e.g., 8G)
    #[arg(long)]
    pub target_size: Option<String>,

    /// Measured runtime per point (e.g., 30s, 5m)
    #[arg(long)]
    pub runtime: Option<String>,

    /// Ramp time per point (e.g., 15s)
    #[arg(long)]
    pub ramp_time: Option<String>,

    /// Sample /proc/diskstats while each point runs
    #[arg(long)]
    pub sample_disk_stats: bool,

    /// Print the plan without touching the device
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(runs) = self.runs {
            if runs == 0 {
                anyhow::bail!("runs must be at least 1");
            }
        }

        if let Some(ref path) = self.report {
            if !path.is_dir() {
                anyhow::bail!("report path {} is not a directory", path.display());
            }
        }

        if self.dry_run && self.dev.is_none() {
            anyhow::bail!("--dry-run requires --dev");
        }

        Ok(())
    }
}

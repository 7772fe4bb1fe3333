//! Workload execution
//!
//! Runs one [`WorkloadPoint`] repetition end to end:
//!
//! 1. Reset the device when the point demands it (every write repetition)
//! 2. Translate the point into a load generator invocation ([`fio`])
//! 3. Record a metadata sidecar next to the raw log
//! 4. Run the load generator, optionally with the disk-stats sampler alongside
//! 5. Hand back the raw result document
//!
//! Points run strictly one at a time; nothing here is shared between threads except
//! the sampler, which lives exactly as long as one invocation.

pub mod fio;
pub mod mock;
pub mod runner;

use crate::config::ExecutionContext;
use crate::device::{DeviceProfile, DeviceReset};
use crate::error::SweepError;
use crate::plan::WorkloadPoint;
use crate::stats::{DiskStatsSampler, RawResultDocument};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Local};
use fio::FioJob;
use runner::CommandRunner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOAD_GENERATOR: &str = "fio";

/// Sidecar written next to every raw log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub log_file: String,
    pub command: String,
    pub start_time: DateTime<Local>,
    pub point: WorkloadPoint,
    /// Invocation parameters in order; repeated keys of two-job runs are kept as a list
    pub parameters: Vec<(String, Option<String>)>,
    pub device_reset: bool,
}

impl RunMetadata {
    pub fn path_for(log_path: &Path) -> PathBuf {
        sidecar(log_path, "metadata.json")
    }

    pub fn write(&self, log_path: &Path) -> Result<()> {
        let path = Self::path_for(log_path);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Parameter values by key, first occurrence wins
    pub fn parameter_map(&self) -> BTreeMap<&str, Option<&str>> {
        let mut map = BTreeMap::new();
        for (key, value) in &self.parameters {
            map.entry(key.as_str()).or_insert(value.as_deref());
        }
        map
    }
}

/// `<log>.<suffix>` next to a raw log
fn sidecar(log_path: &Path, suffix: &str) -> PathBuf {
    let mut name = log_path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Disk-stats log written while the point at `log_path` runs
pub fn diskstats_log_path(log_path: &Path) -> PathBuf {
    sidecar(log_path, "diskstats.csv")
}

/// Executes workload points against one device
pub struct WorkloadExecutor<'a> {
    runner: &'a dyn CommandRunner,
    profile: &'a DeviceProfile,
    ctx: &'a ExecutionContext,
}

impl<'a> WorkloadExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, profile: &'a DeviceProfile, ctx: &'a ExecutionContext) -> Self {
        Self { runner, profile, ctx }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.ctx
    }

    /// Host path of the raw log for `point`
    pub fn log_path(&self, point: &WorkloadPoint) -> PathBuf {
        self.ctx.result_dir.join(point.file_name().to_string())
    }

    /// Load generator parameters for `point`
    pub fn job(&self, point: &WorkloadPoint) -> FioJob {
        let name = point.file_name().to_string();
        let job_name = name.trim_end_matches(".log");
        FioJob::for_point(point, self.profile, self.ctx, job_name)
    }

    /// Run one repetition and return its raw document
    ///
    /// Fails with `DiscardFailure` when the reset fails (the load generator is not
    /// started), `ExternalToolFailure` on a non-zero exit and `ParseFailure` when the
    /// run left no readable output.
    pub fn execute(&self, point: &WorkloadPoint) -> Result<RawResultDocument> {
        if point.requires_reset() {
            DeviceReset::new(self.runner).reset(self.profile)?;
        }

        let log_path = self.log_path(point);
        let job = self.job(point);
        let invocation = fio::invocation(&job, self.ctx, &log_path);

        RunMetadata {
            log_file: point.file_name().to_string(),
            command: invocation.command_line(),
            start_time: Local::now(),
            point: point.clone(),
            parameters: job.params.iter().map(|p| (p.key.clone(), p.value.clone())).collect(),
            device_reset: point.requires_reset(),
        }
        .write(&log_path)?;

        tracing::info!(point = %point.file_name(), "running {}", LOAD_GENERATOR);

        let sampler = if self.ctx.sample_disk_stats {
            let sampler = DiskStatsSampler::new(
                &self.ctx.diskstats,
                self.profile.device_name(),
                Duration::from_millis(self.ctx.sample_interval_ms),
            );
            Some(sampler.start(&diskstats_log_path(&log_path))?)
        } else {
            None
        };

        let output = self.runner.run(&invocation);

        if let Some(handle) = sampler {
            match handle.stop() {
                Ok(rows) => tracing::debug!(rows, "disk-stats sampler stopped"),
                Err(e) => tracing::warn!("disk-stats sampler failed: {:#}", e),
            }
        }

        let output = output?;
        if !output.success() {
            tracing::warn!(
                point = %point.file_name(),
                exit_code = output.exit_code,
                stderr = %output.stderr.trim(),
                "{} failed",
                LOAD_GENERATOR
            );
            return Err(SweepError::ExternalToolFailure {
                tool: LOAD_GENERATOR.to_string(),
                exit_code: output.exit_code,
            }
            .into());
        }

        RawResultDocument::from_file(&log_path).map_err(|e| {
            SweepError::ParseFailure {
                source_name: point.file_name().to_string(),
                reason: format!("{:#}", e),
            }
            .into()
        })
    }
}

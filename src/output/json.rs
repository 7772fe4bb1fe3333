//! JSON run manifest
//!
//! `manifest.json` at the top of a results directory describes the run as a whole:
//! tool version, host, device profile and one summary per benchmark, including every
//! point that left a gap.

use crate::device::DeviceProfile;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One point that did not produce a usable repetition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPoint {
    /// Raw log name of the repetition
    pub log_file: String,
    pub reason: String,
}

/// Outcome of one benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub id: String,
    pub report: Option<PathBuf>,
    pub records: usize,
    pub failed_points: Vec<FailedPoint>,
    /// Set when the benchmark stopped early
    pub aborted: Option<String>,
}

/// Top-level description of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: String,
    pub hostname: String,
    pub num_cpus: usize,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    /// Absent in report-only mode
    pub device: Option<DeviceProfile>,
    pub benchmarks: Vec<BenchmarkSummary>,
}

impl RunManifest {
    pub fn new(device: Option<DeviceProfile>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            num_cpus: num_cpus::get(),
            start_time: Local::now(),
            end_time: None,
            device,
            benchmarks: Vec::new(),
        }
    }

    pub fn add_benchmark(&mut self, summary: BenchmarkSummary) {
        self.benchmarks.push(summary);
    }

    pub fn failed_point_count(&self) -> usize {
        self.benchmarks.iter().map(|b| b.failed_points.len()).sum()
    }

    /// Stamp the end time and write `manifest.json` into `dir`
    pub fn finish(&mut self, dir: &Path) -> Result<PathBuf> {
        self.end_time = Some(Local::now());
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

//! Coordinator module
//!
//! Drives benchmarks one point at a time: plan, execute, aggregate, report. There is
//! exactly one control thread; a point finishes (or fails) before the next starts.
//!
//! Failure policy:
//!
//! - A failed preparation point aborts the benchmark; measuring reads over an
//!   unfilled device is meaningless
//! - A reset failure aborts the benchmark
//! - A failed measured repetition (tool exit, unreadable output) becomes a gap: it
//!   is listed in the summary and its record averages over the remaining repetitions
//!
//! Report-only mode rebuilds reports from a previous run's raw logs without a device.

use crate::bench::Benchmark;
use crate::config::ExecutionContext;
use crate::device::DeviceProfile;
use crate::error::SweepError;
use crate::executor::fio;
use crate::executor::runner::CommandRunner;
use crate::executor::WorkloadExecutor;
use crate::output::text;
use crate::output::{BenchmarkSummary, FailedPoint};
use crate::plan::naming::LOG_EXTENSION;
use crate::plan::ResultFileName;
use crate::stats::{AggregatedRecord, RawResultDocument, ResultAggregator};
use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Result of one benchmark
#[derive(Debug, Clone, Default)]
pub struct BenchmarkOutcome {
    pub summary: BenchmarkSummary,
    pub records: Vec<AggregatedRecord>,
}

fn is_recoverable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SweepError>()
        .map(SweepError::is_recoverable)
        .unwrap_or(false)
}

/// Runs benchmarks against one device
pub struct Coordinator<'a> {
    runner: &'a dyn CommandRunner,
    profile: &'a DeviceProfile,
    /// Shared context; `result_dir` is the run directory
    base: ExecutionContext,
}

impl<'a> Coordinator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, profile: &'a DeviceProfile, base: ExecutionContext) -> Self {
        Self { runner, profile, base }
    }

    /// Context of `bench`, writing into its own directory below the run directory
    fn context_for(&self, bench: &dyn Benchmark) -> ExecutionContext {
        let mut ctx = bench.context(&self.base);
        ctx.result_dir = self.base.result_dir.join(bench.id());
        ctx
    }

    /// Run one benchmark end to end
    ///
    /// Aborts are reported in the summary rather than as an error, so the remaining
    /// benchmarks still run; errors are reserved for the report itself failing.
    pub fn run_benchmark(&self, bench: &dyn Benchmark) -> Result<BenchmarkOutcome> {
        let ctx = self.context_for(bench);
        std::fs::create_dir_all(&ctx.result_dir)
            .with_context(|| format!("Failed to create {}", ctx.result_dir.display()))?;

        let executor = WorkloadExecutor::new(self.runner, self.profile, &ctx);
        let mut aggregator = ResultAggregator::new();
        let mut outcome = BenchmarkOutcome {
            summary: BenchmarkSummary {
                id: bench.id().to_string(),
                ..Default::default()
            },
            records: Vec::new(),
        };

        let plan = bench.plan(self.profile);
        tracing::info!(benchmark = bench.id(), points = plan.len(), "starting benchmark");

        for (i, point) in plan.iter().enumerate() {
            let name = point.file_name().to_string();
            tracing::info!(benchmark = bench.id(), "[{}/{}] {}", i + 1, plan.len(), name);

            match bench.execute(&executor, point) {
                Ok(raw) => {
                    if let Some(record) = bench.aggregate(&mut aggregator, point, Some(&raw)) {
                        outcome.records.push(record);
                    }
                }
                Err(e) if point.is_prep() || !is_recoverable(&e) => {
                    tracing::error!(benchmark = bench.id(), point = %name, "aborting benchmark: {:#}", e);
                    outcome.summary.failed_points.push(FailedPoint {
                        log_file: name,
                        reason: format!("{:#}", e),
                    });
                    outcome.summary.aborted = Some(format!("{:#}", e));
                    break;
                }
                Err(e) => {
                    tracing::warn!(benchmark = bench.id(), point = %name, "repetition failed: {:#}", e);
                    outcome.summary.failed_points.push(FailedPoint {
                        log_file: name,
                        reason: format!("{:#}", e),
                    });
                    if let Some(record) = bench.aggregate(&mut aggregator, point, None) {
                        outcome.records.push(record);
                    }
                }
            }
        }

        let incomplete = aggregator.finish();
        if !incomplete.is_empty() && outcome.summary.aborted.is_none() {
            tracing::warn!(benchmark = bench.id(), keys = incomplete.len(), "points left incomplete");
        }

        self.finish_report(bench, &ctx.result_dir, &mut outcome)?;
        Ok(outcome)
    }

    fn finish_report(&self, bench: &dyn Benchmark, dir: &Path, outcome: &mut BenchmarkOutcome) -> Result<()> {
        let written = bench.report(&outcome.records, dir)?;
        for path in &written {
            println!("  Output written to: {}", path.display());
        }
        outcome.summary.report = written.into_iter().next();
        outcome.summary.records = outcome.records.len();
        text::print_records(bench.id(), &outcome.records);
        Ok(())
    }

    /// Print the plan and the exact load generator commands without running anything
    pub fn dry_run(&self, bench: &dyn Benchmark) -> Vec<String> {
        let ctx = self.context_for(bench);
        let executor = WorkloadExecutor::new(self.runner, self.profile, &ctx);

        println!("{} (dry run)", bench.id());
        let mut commands = Vec::new();
        for point in bench.plan(self.profile) {
            let log_path = executor.log_path(&point);
            let invocation = fio::invocation(&executor.job(&point), &ctx, &log_path);
            let line = invocation.command_line();
            if point.requires_reset() {
                println!("  # reset {} first", self.profile.device.display());
            }
            println!("  {}", line);
            commands.push(line);
        }
        println!();
        commands
    }
}

/// Sorted raw logs of one benchmark directory
pub fn raw_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|ext| ext == LOG_EXTENSION).unwrap_or(false))
        .collect();
    logs.sort();
    Ok(logs)
}

/// Rebuild `bench`'s report from the raw logs under `run_dir/<id>/`
pub fn rebuild_report(bench: &dyn Benchmark, run_dir: &Path) -> Result<BenchmarkOutcome> {
    let dir = run_dir.join(bench.id());
    let mut aggregator = ResultAggregator::new();
    let mut outcome = BenchmarkOutcome {
        summary: BenchmarkSummary {
            id: bench.id().to_string(),
            ..Default::default()
        },
        records: Vec::new(),
    };

    for log in raw_logs(&dir)? {
        let file_name = log
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name: ResultFileName = match file_name.parse() {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("ignoring {}: {}", file_name, e);
                continue;
            }
        };
        let Some(point) = name.measured_point() else {
            tracing::debug!(log = %file_name, "skipping preparation log");
            continue;
        };

        let raw = match RawResultDocument::from_file(&log) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::warn!("cannot read {}: {:#}", file_name, e);
                outcome.summary.failed_points.push(FailedPoint {
                    log_file: file_name.clone(),
                    reason: format!("{:#}", e),
                });
                None
            }
        };
        if let Some(record) = bench.aggregate(&mut aggregator, &point, raw.as_ref()) {
            outcome.records.push(record);
        }
    }

    let incomplete = aggregator.finish();
    if !incomplete.is_empty() {
        tracing::warn!(benchmark = bench.id(), keys = incomplete.len(), "logs missing for some repetitions");
    }

    let written = bench.report(&outcome.records, &dir)?;
    for path in &written {
        println!("  Output written to: {}", path.display());
    }
    outcome.summary.report = written.into_iter().next();
    outcome.summary.records = outcome.records.len();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{SteadyState, ThroughputSweep};
    use crate::config::SweepConfig;
    use crate::executor::mock::MockRunner;
    use crate::output::read_report;
    use crate::plan::Operation;
    use crate::stats::fixtures::fio_json;
    use tempfile::TempDir;

    fn config() -> SweepConfig {
        let mut config = SweepConfig::default();
        config.sweep.operations = vec![Operation::SequentialRead, Operation::SequentialWrite];
        config.sweep.parallelism_levels = vec![1];
        config.sweep.queue_depths = vec![1];
        config.sweep.block_sizes = vec![4096];
        config.sweep.repetitions = 2;
        config.sweep.target_bytes = 1 << 30;
        config
    }

    fn zoned() -> DeviceProfile {
        DeviceProfile::zoned("/dev/nvme0n2", 16, 1 << 30, 1 << 30, 14, 4096).unwrap()
    }

    fn base(config: &SweepConfig, dir: &TempDir) -> ExecutionContext {
        ExecutionContext::new(config, Path::new("/dev/nvme0n2"), dir.path())
    }

    /// Plan: prep, read x2, write x2; writes and prep reset first
    fn queue_full_run(runner: &MockRunner) {
        runner.push_exit_code(0); // prep reset
        runner.push_document(&fio_json(0, 1 << 30, 1000, 0.0));
        runner.push_document(&fio_json(1 << 20, 0, 1000, 100_000.0));
        runner.push_document(&fio_json(1 << 20, 0, 1000, 200_000.0));
        runner.push_exit_code(0);
        runner.push_document(&fio_json(0, 2 << 20, 1000, 50_000.0));
        runner.push_exit_code(0);
        runner.push_document(&fio_json(0, 2 << 20, 1000, 70_000.0));
    }

    #[test]
    fn test_full_sweep() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let profile = zoned();
        let runner = MockRunner::new();
        queue_full_run(&runner);

        let coordinator = Coordinator::new(&runner, &profile, base(&config, &dir));
        let outcome = coordinator.run_benchmark(&ThroughputSweep::new(&config)).unwrap();

        assert_eq!(
            runner.programs(),
            vec!["blkzone", "fio", "fio", "fio", "blkzone", "fio", "blkzone", "fio"]
        );
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].key.operation, Operation::SequentialRead);
        assert_eq!(outcome.records[0].mean_latency_us, 150);
        assert_eq!(outcome.records[1].mean_latency_us, 60);
        assert!(outcome.summary.failed_points.is_empty());

        let report = outcome.summary.report.unwrap();
        assert_eq!(read_report(&report).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_repetition_leaves_gap() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let profile = zoned();
        let runner = MockRunner::new();
        runner.push_exit_code(0);
        runner.push_document(&fio_json(0, 1 << 30, 1000, 0.0));
        runner.push_exit_code(1); // first read repetition fails
        runner.push_document(&fio_json(1 << 20, 0, 1000, 200_000.0));
        for _ in 0..2 {
            runner.push_exit_code(0);
            runner.push_document(&fio_json(0, 2 << 20, 1000, 50_000.0));
        }

        let coordinator = Coordinator::new(&runner, &profile, base(&config, &dir));
        let outcome = coordinator.run_benchmark(&ThroughputSweep::new(&config)).unwrap();

        assert_eq!(outcome.summary.failed_points.len(), 1);
        assert_eq!(
            outcome.summary.failed_points[0].log_file,
            "00-read-0001-0001-000004096-001of002.log"
        );
        assert!(outcome.summary.aborted.is_none());
        let read = &outcome.records[0];
        assert_eq!(read.repetitions, 1);
        assert_eq!(read.mean_latency_us, 200);
    }

    #[test]
    fn test_failed_prep_aborts() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let profile = zoned();
        let runner = MockRunner::new();
        runner.push_exit_code(0);
        runner.push_exit_code(1);

        let coordinator = Coordinator::new(&runner, &profile, base(&config, &dir));
        let outcome = coordinator.run_benchmark(&ThroughputSweep::new(&config)).unwrap();

        assert!(outcome.summary.aborted.is_some());
        assert!(outcome.records.is_empty());
        assert_eq!(runner.programs(), vec!["blkzone", "fio"]);
    }

    #[test]
    fn test_dry_run_executes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let profile = zoned();
        let runner = MockRunner::new();

        let coordinator = Coordinator::new(&runner, &profile, base(&config, &dir));
        let commands = coordinator.dry_run(&ThroughputSweep::new(&config));

        assert_eq!(commands.len(), 5);
        assert!(commands[0].contains("--rw=write"));
        assert!(commands[0].contains("fio_zone_throughput_avg_lat/00-read-0000-prep.log"));
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn test_rebuild_matches_live_report() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let profile = zoned();
        let runner = MockRunner::new();
        queue_full_run(&runner);

        let bench = ThroughputSweep::new(&config);
        let live = Coordinator::new(&runner, &profile, base(&config, &dir))
            .run_benchmark(&bench)
            .unwrap();

        let rebuilt = rebuild_report(&bench, dir.path()).unwrap();
        assert_eq!(rebuilt.records, live.records);
    }

    #[test]
    fn test_rebuild_skips_prep_and_bad_logs() {
        let dir = TempDir::new().unwrap();
        let bench_dir = dir.path().join(crate::bench::steady_state::ID);
        std::fs::create_dir_all(&bench_dir).unwrap();
        std::fs::write(bench_dir.join("03-randwrite-0000-prep.log"), "garbage").unwrap();
        std::fs::write(
            bench_dir.join("03-randwrite-0016-0016-000065536-001of002.log"),
            fio_json(0, 1 << 30, 1000, 500_000.0),
        )
        .unwrap();
        std::fs::write(
            bench_dir.join("03-randwrite-0016-0016-000065536-002of002.log"),
            "{\"jobs\": [",
        )
        .unwrap();
        std::fs::write(bench_dir.join("notes.txt"), "ignored").unwrap();

        let outcome = rebuild_report(&SteadyState::new(&SweepConfig::default()), dir.path()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].repetitions, 1);
        assert_eq!(outcome.records[0].mean_latency_us, 500);
    }
}

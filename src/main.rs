//! zbdsweep CLI entry point

use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zbdsweep::bench::{self, Benchmark};
use zbdsweep::config::{cli::Cli, validator, ContainerMode, ExecutionContext, SweepConfig};
use zbdsweep::coordinator::{self, Coordinator};
use zbdsweep::device::{checks, CapabilityProbe, DeviceReset, SysfsProbe};
use zbdsweep::executor::runner::SystemRunner;
use zbdsweep::output::{text, RunManifest};

const RESULTS_DIR: &str = "zbdsweep_results";

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;
    init_logging(cli.verbose);

    let config = zbdsweep::config::toml::load_config(&cli)?;
    let config = validator::validate_and_normalize(config).context("Configuration validation failed")?;

    if cli.list_benchmarks {
        bench::list(&config);
        return Ok(());
    }

    println!("zbdsweep v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let benchmarks = bench::select(&config, &cli.benchmarks)?;

    if let Some(ref run_dir) = cli.report {
        return run_report(&benchmarks, run_dir);
    }

    let device = config
        .device
        .path
        .clone()
        .context("no device given (use --dev)")?;
    run_device(&config, &device, &benchmarks)
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Rebuild reports from an existing results directory
fn run_report(benchmarks: &[Box<dyn Benchmark>], run_dir: &Path) -> Result<()> {
    println!("Rebuilding reports from {}", run_dir.display());
    println!();

    let mut manifest = RunManifest::new(None);
    for bench in benchmarks {
        if !run_dir.join(bench.id()).is_dir() {
            tracing::info!(benchmark = bench.id(), "no results directory, skipping");
            continue;
        }
        let outcome = coordinator::rebuild_report(bench.as_ref(), run_dir)?;
        manifest.add_benchmark(outcome.summary);
    }

    let path = manifest.finish(run_dir)?;
    println!("Manifest written to: {}", path.display());
    Ok(())
}

/// Tools that must be on PATH before anything touches the device
fn required_tools<'a>(config: &'a SweepConfig, benchmarks: &[Box<dyn Benchmark>], zoned: bool) -> Vec<&'a str> {
    let mut tools = vec![DeviceReset::program(zoned)];
    match config.execution.container {
        ContainerMode::Docker => tools.push(config.execution.container_engine.as_str()),
        ContainerMode::System => {
            if benchmarks.iter().any(|b| b.required_tools().contains(&"fio")) {
                tools.push(config.execution.fio_binary.as_str());
            }
        }
    }
    tools
}

/// Probe, check and run every selected benchmark against `device`
fn run_device(config: &SweepConfig, device: &Path, benchmarks: &[Box<dyn Benchmark>]) -> Result<()> {
    checks::check_device_string(device)?;
    checks::check_not_mounted(device, &config.device.mounts_table)?;

    let output_root = config.execution.output_dir.join(RESULTS_DIR);
    let run_dir = output_root.join(chrono::Local::now().format("%Y%m%d%H%M%S").to_string());

    let runner = SystemRunner::new(config.execution.container, device, &run_dir)
        .with_images(&config.execution.container_engine, &config.execution.fio_image);

    let profile = SysfsProbe::with_root(&config.device.sysfs_root, &runner)
        .probe(device)
        .with_context(|| format!("Failed to probe {}", device.display()))?;
    text::print_profile(&profile);
    println!();

    let search_path = std::env::var("PATH").unwrap_or_default();
    checks::check_tools(required_tools(config, benchmarks, profile.is_zoned), &search_path)?;

    let base = ExecutionContext::new(config, device, &run_dir);
    let coordinator = Coordinator::new(&runner, &profile, base);

    if config.execution.dry_run {
        for bench in benchmarks {
            coordinator.dry_run(bench.as_ref());
        }
        println!("Dry run mode - nothing was executed");
        return Ok(());
    }

    create_run_dir(&run_dir)?;
    println!("Results: {}", run_dir.display());
    println!();

    let mut manifest = RunManifest::new(Some(profile.clone()));
    for bench in benchmarks {
        println!("Running {}: {}", bench.id(), bench.description());
        checks::ensure_scheduler(&config.device.sysfs_root, device, bench.preferred_scheduler())?;

        let outcome = coordinator.run_benchmark(bench.as_ref())?;
        manifest.add_benchmark(outcome.summary);
        println!();
    }

    let path = manifest.finish(&run_dir)?;
    println!("Manifest written to: {}", path.display());

    let aborted: Vec<&str> = manifest
        .benchmarks
        .iter()
        .filter(|b| b.aborted.is_some())
        .map(|b| b.id.as_str())
        .collect();
    if manifest.failed_point_count() > 0 {
        tracing::warn!(failed = manifest.failed_point_count(), "some points failed, see {}", path.display());
    }
    if !aborted.is_empty() {
        anyhow::bail!("aborted: {}", aborted.join(", "));
    }
    Ok(())
}

/// A run never writes into an existing results directory
fn create_run_dir(run_dir: &Path) -> Result<()> {
    if run_dir.exists() {
        anyhow::bail!("results directory {} already exists", run_dir.display());
    }
    std::fs::create_dir_all(run_dir).with_context(|| format!("Failed to create {}", run_dir.display()))
}

//! TOML configuration file parsing

use super::cli_convert::{convert_container_mode, convert_output_format, parse_duration, parse_size};
use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<SweepConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<SweepConfig> {
    let config: SweepConfig = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: SweepConfig) -> Result<SweepConfig> {
    if let Some(ref dev) = cli.dev {
        config.device.path = Some(dev.clone());
    }

    if let Some(container) = cli.container {
        config.execution.container = convert_container_mode(container);
    }
    if let Some(format) = cli.format {
        config.execution.output_format = convert_output_format(format);
    }
    if let Some(ref output) = cli.output {
        config.execution.output_dir = output.clone();
    }
    if cli.sample_disk_stats {
        config.execution.sample_disk_stats = true;
    }
    if cli.dry_run {
        config.execution.dry_run = true;
    }

    if let Some(runs) = cli.runs {
        config.sweep.repetitions = runs;
    }
    if let Some(ref size) = cli.target_size {
        config.sweep.target_bytes = parse_size(size)?;
    }
    if let Some(ref runtime) = cli.runtime {
        config.sweep.runtime_secs = parse_duration(runtime)?;
    }
    if let Some(ref ramp) = cli.ramp_time {
        config.sweep.ramp_time_secs = parse_duration(ramp)?;
    }

    Ok(config)
}

/// Load the configuration named on the command line (or defaults) and apply CLI overrides
pub fn load_config(cli: &Cli) -> Result<SweepConfig> {
    let config = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => SweepConfig::default(),
    };
    merge_cli_with_config(cli, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let config = parse_toml_string("").unwrap();
        assert_eq!(config.sweep.repetitions, 1);
        assert_eq!(config.execution.fio_binary, "fio");
        assert!(config.device.path.is_none());
    }

    #[test]
    fn test_parse_toml_sections() {
        let toml = r#"
[device]
path = "/dev/nvme0n2"
capacity_fraction = 0.8

[execution]
container = "docker"
output_format = "terse"
sample_disk_stats = true

[sweep]
operations = ["randread", "sequential-write"]
parallelism_levels = [1, 4]
queue_depths = [1, 4, 16]
block_sizes = [4096, 131072]
repetitions = 3
target_bytes = 1073741824

[mixed]
write_rates_mib = [50, 100]

[zone_writes]
passes = 3
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.device.path, Some(PathBuf::from("/dev/nvme0n2")));
        assert_eq!(config.device.capacity_fraction, 0.8);
        assert_eq!(config.execution.container, ContainerMode::Docker);
        assert_eq!(config.execution.output_format, OutputFormat::Terse);
        assert!(config.execution.sample_disk_stats);
        assert_eq!(
            config.sweep.operations,
            vec![Operation::RandomRead, Operation::SequentialWrite]
        );
        assert_eq!(config.sweep.repetitions, 3);
        assert_eq!(config.mixed.write_rates_mib, vec![50, 100]);
        // Untouched sections keep their defaults
        assert_eq!(config.steady_state.jobs, 16);
        assert_eq!(config.mixed.runtime_secs, 180);
        assert_eq!(config.zone_writes.passes, 3);
        assert_eq!(config.zone_writes.jobs, 14);
        assert_eq!(config.phases.queue_depth, 64);
    }

    #[test]
    fn test_parse_toml_spdk() {
        let toml = r#"
[execution.spdk]
path = "/opt/spdk"
json_conf = "/opt/spdk/bdev.json"
"#;
        let config = parse_toml_string(toml).unwrap();
        let spdk = config.execution.spdk.unwrap();
        assert_eq!(spdk.bdev, "Uring0");
        assert_eq!(spdk.json_conf, PathBuf::from("/opt/spdk/bdev.json"));
    }

    #[test]
    fn test_parse_toml_rejects_unknown_operation() {
        assert!(parse_toml_string("[sweep]\noperations = [\"trim\"]\n").is_err());
    }

    #[test]
    fn test_merge_cli_overrides() {
        let cli = Cli::try_parse_from([
            "zbdsweep",
            "-d",
            "/dev/nvme1n1",
            "-c",
            "docker",
            "--runs",
            "4",
            "--target-size",
            "2G",
            "--runtime",
            "1m",
        ])
        .unwrap();

        let config = merge_cli_with_config(&cli, SweepConfig::default()).unwrap();
        assert_eq!(config.device.path, Some(PathBuf::from("/dev/nvme1n1")));
        assert_eq!(config.execution.container, ContainerMode::Docker);
        assert_eq!(config.sweep.repetitions, 4);
        assert_eq!(config.sweep.target_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.sweep.runtime_secs, 60);
        assert_eq!(config.sweep.ramp_time_secs, 15);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("zbdsweep.toml");
        fs::write(&path, "[sweep]\nrepetitions = 5\n").unwrap();

        let cli = Cli::try_parse_from([
            "zbdsweep",
            "-l",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        assert_eq!(load_config(&cli).unwrap().sweep.repetitions, 5);
    }
}

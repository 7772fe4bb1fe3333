//! Configuration validation

use super::*;
use crate::error::SweepError;
use anyhow::Result;

/// Largest job count or queue depth a raw result file name can carry (4 digits)
pub const MAX_LEVEL: u32 = 9_999;

/// Largest block size a raw result file name can carry (9 digits)
pub const MAX_BLOCK_SIZE: u64 = 999_999_999;

/// Largest write rate in MiB/s whose byte rate fits the 12-digit name field
pub const MAX_WRITE_RATE_MIB: u64 = 999_999_999_999 / (1024 * 1024);

macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err(SweepError::InvalidConfig(format!($($arg)*)).into())
    };
}

/// Validate complete configuration
pub fn validate_config(config: &SweepConfig) -> Result<()> {
    validate_device(&config.device)?;
    validate_execution(&config.execution)?;
    validate_sweep(&config.sweep)?;
    validate_steady_state(&config.steady_state)?;
    validate_mixed(&config.mixed)?;
    validate_zone_writes(&config.zone_writes)?;
    validate_phases(&config.phases)?;
    Ok(())
}

/// Validate and bring the sweep axes into canonical order
///
/// Operations follow their canonical order and numeric axes ascend without
/// duplicates, so the plan order matches a sorted listing of raw result files.
pub fn validate_and_normalize(mut config: SweepConfig) -> Result<SweepConfig> {
    validate_config(&config)?;

    let axes = config.sweep.axes().normalized();
    config.sweep.operations = axes.operations;
    config.sweep.parallelism_levels = axes.parallelism_levels;
    config.sweep.queue_depths = axes.queue_depths;
    config.sweep.block_sizes = axes.block_sizes;

    config.mixed.write_rates_mib.sort_unstable();
    config.mixed.write_rates_mib.dedup();

    Ok(config)
}

pub fn validate_device(device: &DeviceConfig) -> Result<()> {
    if !(device.capacity_fraction > 0.0 && device.capacity_fraction <= 1.0) {
        invalid!(
            "capacity_fraction must be in (0, 1], got {}",
            device.capacity_fraction
        );
    }
    Ok(())
}

pub fn validate_execution(execution: &ExecutionConfig) -> Result<()> {
    if execution.fio_binary.trim().is_empty() {
        invalid!("fio_binary must not be empty");
    }
    if execution.sample_disk_stats && execution.sample_interval_ms == 0 {
        invalid!("sample_interval_ms must be greater than 0");
    }
    if let Some(ref spdk) = execution.spdk {
        if spdk.bdev.trim().is_empty() {
            invalid!("spdk.bdev must not be empty");
        }
    }
    Ok(())
}

fn validate_block_size(block_size: u64, what: &str) -> Result<()> {
    if block_size == 0 || block_size % 512 != 0 {
        invalid!("{} must be a non-zero multiple of 512, got {}", what, block_size);
    }
    if block_size > MAX_BLOCK_SIZE {
        invalid!("{} must be at most {}, got {}", what, MAX_BLOCK_SIZE, block_size);
    }
    Ok(())
}

fn validate_levels(levels: &[u32], what: &str) -> Result<()> {
    if levels.is_empty() {
        invalid!("{} must not be empty", what);
    }
    if levels.contains(&0) {
        invalid!("{} must not contain 0", what);
    }
    validate_level_limit(levels, what)
}

fn validate_level_limit(levels: &[u32], what: &str) -> Result<()> {
    if let Some(level) = levels.iter().find(|&&l| l > MAX_LEVEL) {
        invalid!("{} must be at most {}, got {}", what, MAX_LEVEL, level);
    }
    Ok(())
}

pub fn validate_sweep(sweep: &SweepSection) -> Result<()> {
    if sweep.operations.is_empty() {
        invalid!("sweep.operations must not be empty");
    }
    validate_levels(&sweep.parallelism_levels, "sweep.parallelism_levels")?;
    validate_levels(&sweep.queue_depths, "sweep.queue_depths")?;

    if sweep.block_sizes.is_empty() {
        invalid!("sweep.block_sizes must not be empty");
    }
    for &bs in &sweep.block_sizes {
        validate_block_size(bs, "sweep.block_sizes entry")?;
    }

    if sweep.repetitions == 0 {
        invalid!("sweep.repetitions must be at least 1");
    }
    if sweep.repetitions > 999 {
        invalid!("sweep.repetitions must be at most 999, got {}", sweep.repetitions);
    }
    if sweep.target_bytes == 0 {
        invalid!("sweep.target_bytes must be greater than 0");
    }
    Ok(())
}

pub fn validate_steady_state(steady: &SteadyStateConfig) -> Result<()> {
    if steady.jobs == 0 {
        invalid!("steady_state.jobs must be at least 1");
    }
    validate_level_limit(&[steady.jobs], "steady_state.jobs")?;
    if steady.passes == 0 {
        invalid!("steady_state.passes must be at least 1");
    }
    validate_block_size(steady.block_size, "steady_state.block_size")
}

pub fn validate_mixed(mixed: &MixedConfig) -> Result<()> {
    if mixed.write_rates_mib.is_empty() {
        invalid!("mixed.write_rates_mib must not be empty");
    }
    if mixed.write_rates_mib.contains(&0) {
        invalid!("mixed.write_rates_mib must not contain 0");
    }
    if let Some(rate) = mixed.write_rates_mib.iter().find(|&&r| r > MAX_WRITE_RATE_MIB) {
        invalid!("mixed.write_rates_mib must be at most {}, got {}", MAX_WRITE_RATE_MIB, rate);
    }
    validate_block_size(mixed.read_block_size, "mixed.read_block_size")?;
    validate_block_size(mixed.write_block_size, "mixed.write_block_size")?;
    if mixed.read_queue_depth == 0 || mixed.write_queue_depth == 0 {
        invalid!("mixed queue depths must be at least 1");
    }
    validate_level_limit(&[mixed.read_queue_depth, mixed.write_queue_depth], "mixed queue depths")?;
    if mixed.rwmixread > 100 {
        invalid!("mixed.rwmixread must be between 0 and 100, got {}", mixed.rwmixread);
    }
    Ok(())
}

pub fn validate_zone_writes(zone_writes: &ZoneWritesConfig) -> Result<()> {
    validate_levels(&[zone_writes.jobs], "zone_writes.jobs")?;
    if zone_writes.passes == 0 {
        invalid!("zone_writes.passes must be at least 1");
    }
    validate_block_size(zone_writes.block_size, "zone_writes.block_size")
}

pub fn validate_phases(phases: &PhasesConfig) -> Result<()> {
    validate_levels(&[phases.queue_depth], "phases.queue_depth")?;
    validate_levels(&[phases.random_readers], "phases.random_readers")?;
    if u64::from(phases.random_readers) * u64::from(phases.queue_depth) > u64::from(MAX_LEVEL) {
        invalid!(
            "phases.random_readers x phases.queue_depth must be at most {}, got {}",
            MAX_LEVEL,
            u64::from(phases.random_readers) * u64::from(phases.queue_depth)
        );
    }
    validate_block_size(phases.random_read_block_size, "phases.random_read_block_size")?;
    validate_block_size(phases.block_size, "phases.block_size")?;
    if phases.rwmixread > 100 {
        invalid!("phases.rwmixread must be between 0 and 100, got {}", phases.rwmixread);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_invalid_config(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<SweepError>(), Some(SweepError::InvalidConfig(_)))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SweepConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_empty_axes() {
        let mut config = SweepConfig::default();
        config.sweep.queue_depths.clear();
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.sweep.operations.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_values() {
        let mut config = SweepConfig::default();
        config.sweep.parallelism_levels = vec![0, 1];
        assert!(validate_config(&config).is_err());

        let mut config = SweepConfig::default();
        config.sweep.repetitions = 0;
        assert!(validate_config(&config).is_err());

        let mut config = SweepConfig::default();
        config.sweep.target_bytes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_unaligned_block_size() {
        let mut config = SweepConfig::default();
        config.sweep.block_sizes = vec![4096, 1000];
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));
    }

    #[test]
    fn test_rejects_values_wider_than_file_name_fields() {
        let mut config = SweepConfig::default();
        config.sweep.parallelism_levels = vec![1, 10_000];
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.sweep.queue_depths = vec![10_000];
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.sweep.block_sizes = vec![1_000_000_000];
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.mixed.read_queue_depth = 10_000;
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.mixed.read_block_size = 1_000_000_512;
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.steady_state.jobs = 10_000;
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.mixed.write_rates_mib = vec![25, MAX_WRITE_RATE_MIB + 1];
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));
    }

    #[test]
    fn test_accepts_values_at_file_name_limits() {
        let mut config = SweepConfig::default();
        config.sweep.parallelism_levels = vec![MAX_LEVEL];
        config.sweep.queue_depths = vec![MAX_LEVEL];
        config.sweep.block_sizes = vec![MAX_BLOCK_SIZE - MAX_BLOCK_SIZE % 512];
        config.mixed.write_rates_mib = vec![MAX_WRITE_RATE_MIB];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zone_writes_and_phases_validation() {
        let mut config = SweepConfig::default();
        config.zone_writes.passes = 0;
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.zone_writes.block_size = 1000;
        assert!(validate_config(&config).is_err());

        let mut config = SweepConfig::default();
        config.phases.random_readers = 200;
        assert!(is_invalid_config(&validate_config(&config).unwrap_err()));

        let mut config = SweepConfig::default();
        config.phases.rwmixread = 101;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_capacity_fraction_range() {
        for bad in [0.0, -0.5, 1.5] {
            let mut config = SweepConfig::default();
            config.device.capacity_fraction = bad;
            assert!(validate_config(&config).is_err(), "{}", bad);
        }
        let mut config = SweepConfig::default();
        config.device.capacity_fraction = 0.5;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_normalize_axes() {
        let mut config = SweepConfig::default();
        config.sweep.operations = vec![
            Operation::SequentialWrite,
            Operation::RandomRead,
            Operation::SequentialWrite,
        ];
        config.sweep.queue_depths = vec![16, 1, 4, 1];
        config.sweep.block_sizes = vec![131072, 4096];
        config.mixed.write_rates_mib = vec![100, 25, 100];

        let config = validate_and_normalize(config).unwrap();
        assert_eq!(
            config.sweep.operations,
            vec![Operation::RandomRead, Operation::SequentialWrite]
        );
        assert_eq!(config.sweep.queue_depths, vec![1, 4, 16]);
        assert_eq!(config.sweep.block_sizes, vec![4096, 131072]);
        assert_eq!(config.mixed.write_rates_mib, vec![25, 100]);
    }

    #[test]
    fn test_mixed_validation() {
        let mut config = SweepConfig::default();
        config.mixed.rwmixread = 120;
        assert!(validate_config(&config).is_err());

        let mut config = SweepConfig::default();
        config.mixed.write_rates_mib = vec![];
        assert!(validate_config(&config).is_err());
    }
}

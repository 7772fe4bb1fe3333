//! Pre-run safety checks
//!
//! Run before anything destructive happens. Each check either passes (and prints
//! a `Check OK` line for the operator) or fails with `PreconditionFailure`.

use super::device_name;
use crate::error::SweepError;
use crate::Result;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// I/O scheduler a benchmark wants on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    None,
    MqDeadline,
}

impl Scheduler {
    pub fn sysfs_name(&self) -> &'static str {
        match self {
            Scheduler::None => "none",
            Scheduler::MqDeadline => "mq-deadline",
        }
    }
}

fn precondition(msg: String) -> anyhow::Error {
    SweepError::PreconditionFailure(msg).into()
}

/// Device must be named `/dev/<name>` with an alphanumeric (or `_`) name
pub fn check_device_string(device: &Path) -> Result<()> {
    let text = device.to_string_lossy();
    let valid = text
        .strip_prefix("/dev/")
        .map(|name| !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(false);

    if !valid {
        return Err(precondition(format!(
            "device must be named /dev/[a-zA-Z0-9_]+ (e.g., /dev/nvme0n1), got {}",
            text
        )));
    }
    Ok(())
}

/// Device must not be mounted (checked against a mounts table such as `/proc/mounts`)
pub fn check_not_mounted(device: &Path, mounts_table: &Path) -> Result<()> {
    let mounts = fs::read_to_string(mounts_table).map_err(|e| {
        precondition(format!("cannot read {}: {}", mounts_table.display(), e))
    })?;

    let device = device.to_string_lossy();
    let mounted = mounts
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|source| is_device_or_partition(source, &device));

    if mounted {
        return Err(precondition(format!("{} is mounted", device)));
    }
    Ok(())
}

/// `source` names `device` itself or one of its partitions
///
/// Partitions of names ending in a digit take a `p` separator (`nvme0n1p2`), others
/// append the number directly (`sda1`). `nvme0n10p1` is not a partition of `nvme0n1`.
fn is_device_or_partition(source: &str, device: &str) -> bool {
    let Some(rest) = source.strip_prefix(device) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let number = if device.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(number) => number,
            None => return false,
        }
    } else {
        rest
    };
    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
}

/// Every tool must be an executable on the search path
pub fn check_tools<'a>(tools: impl IntoIterator<Item = &'a str>, search_path: &str) -> Result<()> {
    let missing: BTreeSet<&str> = tools
        .into_iter()
        .filter(|tool| find_executable(tool, search_path).is_none())
        .collect();

    if !missing.is_empty() {
        let names: Vec<&str> = missing.into_iter().collect();
        return Err(precondition(format!("required tools not available: {}", names.join(", "))));
    }
    Ok(())
}

/// Locate `tool` on a `PATH`-style search path (absolute paths are checked directly)
pub fn find_executable(tool: &str, search_path: &str) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let is_exec = |p: &Path| {
        fs::metadata(p)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    };

    if tool.contains('/') {
        let path = PathBuf::from(tool);
        return is_exec(&path).then_some(path);
    }

    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(tool))
        .find(|candidate| is_exec(candidate))
}

/// Select `wanted` as the device's I/O scheduler if it is not already active
///
/// The scheduler file lists all choices with the active one in brackets,
/// e.g. `[none] mq-deadline kyber`.
pub fn ensure_scheduler(sysfs_root: &Path, device: &Path, wanted: Scheduler) -> Result<()> {
    let path = sysfs_root
        .join("block")
        .join(device_name(device))
        .join("queue/scheduler");
    let active = format!("[{}]", wanted.sysfs_name());

    let current = fs::read_to_string(&path)
        .map_err(|e| precondition(format!("cannot read {}: {}", path.display(), e)))?;
    if current.contains(&active) {
        return Ok(());
    }

    fs::write(&path, wanted.sysfs_name())
        .map_err(|e| precondition(format!("cannot set scheduler via {}: {}", path.display(), e)))?;

    let after = fs::read_to_string(&path)
        .map_err(|e| precondition(format!("cannot read {}: {}", path.display(), e)))?;
    if !after.contains(&active) {
        return Err(precondition(format!(
            "{} does not support the {} scheduler",
            device.display(),
            wanted.sysfs_name()
        )));
    }
    Ok(())
}

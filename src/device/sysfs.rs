//! Host block-layer capability oracle
//!
//! Builds a [`DeviceProfile`] from `/sys/block/<dev>` attributes:
//!
//! - `size`: device size in 512-byte sectors
//! - `queue/zoned`: `host-managed` marks a zoned device
//! - `queue/hw_sector_size`: logical sector size
//! - `queue/chunk_sectors`: zone size in 512-byte sectors
//! - `queue/nr_zones`: zone count
//! - `queue/max_open_zones`: open zone ceiling (0 = unlimited)
//!
//! Zone capacity is not exported by sysfs; it comes from the first entry of
//! `blkzone report`. When the report has no `cap` field (older util-linux, or
//! devices without capacity support), the zone size is used.
//!
//! If `size` cannot be read the device is unavailable. When sysfs has no size file,
//! the size is taken from the BLKGETSIZE64 ioctl on the device node.

use super::{device_name, CapabilityProbe, DeviceProfile};
use crate::error::SweepError;
use crate::executor::runner::{CommandRunner, Invocation};
use crate::Result;
use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

// ioctl request code for getting block device size
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

const SYSFS_SECTOR: u64 = 512;

/// Capability probe backed by sysfs and `blkzone report`
pub struct SysfsProbe<'a> {
    /// Root of the sysfs tree (normally `/sys`)
    sysfs_root: PathBuf,

    /// Runs `blkzone report` for zone capacity
    runner: &'a dyn CommandRunner,

    /// `blkzone` executable
    blkzone: String,
}

impl<'a> SysfsProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self::with_root("/sys", runner)
    }

    /// Probe against an alternative sysfs tree
    pub fn with_root(sysfs_root: impl Into<PathBuf>, runner: &'a dyn CommandRunner) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            runner,
            blkzone: "blkzone".to_string(),
        }
    }

    fn block_dir(&self, device: &Path) -> PathBuf {
        self.sysfs_root.join("block").join(device_name(device))
    }

    fn read_attr(&self, device: &Path, attr: &str) -> Option<String> {
        fs::read_to_string(self.block_dir(device).join(attr))
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn read_u64(&self, device: &Path, attr: &str) -> Option<u64> {
        self.read_attr(device, attr)?.parse().ok()
    }

    fn total_size(&self, device: &Path) -> Result<u64> {
        if let Some(sectors) = self.read_u64(device, "size") {
            return Ok(sectors * SYSFS_SECTOR);
        }

        ioctl_size(device).map_err(|e| {
            anyhow::Error::from(SweepError::DeviceUnavailable {
                device: device.display().to_string(),
                reason: format!("no sysfs size attribute and BLKGETSIZE64 failed: {}", e),
            })
        })
    }

    fn zone_capacity(&self, device: &Path, zone_size_bytes: u64) -> Result<u64> {
        let invocation = Invocation::new(&self.blkzone)
            .arg("report")
            .arg("--count")
            .arg("1")
            .arg(device.display().to_string());

        let output = self.runner.run(&invocation)?;
        if output.exit_code != 0 {
            return Err(SweepError::DeviceNotReady {
                device: device.display().to_string(),
                reason: format!("blkzone report exited with {}", output.exit_code),
            }
            .into());
        }

        Ok(parse_zone_capacity_sectors(&output.stdout)
            .map(|sectors| sectors * SYSFS_SECTOR)
            .unwrap_or(zone_size_bytes))
    }
}

impl CapabilityProbe for SysfsProbe<'_> {
    fn probe(&self, device: &Path) -> Result<DeviceProfile> {
        let name = device.display().to_string();
        if !self.block_dir(device).exists() {
            return Err(SweepError::DeviceUnavailable {
                device: name,
                reason: format!("{} does not exist", self.block_dir(device).display()),
            }
            .into());
        }

        let total_size = self.total_size(device)?;
        let sector_size = self
            .read_u64(device, "queue/hw_sector_size")
            .or_else(|| self.read_u64(device, "queue/logical_block_size"))
            .unwrap_or(SYSFS_SECTOR) as u32;

        let zoned = self
            .read_attr(device, "queue/zoned")
            .map(|model| model.contains("host-managed"))
            .unwrap_or(false);

        if !zoned {
            return Ok(DeviceProfile::conventional(device, total_size, sector_size));
        }

        let not_ready = |attr: &str| SweepError::DeviceNotReady {
            device: name.clone(),
            reason: format!("missing queue/{}", attr),
        };
        let zone_sectors = self
            .read_u64(device, "queue/chunk_sectors")
            .ok_or_else(|| not_ready("chunk_sectors"))?;
        let zone_count = self
            .read_u64(device, "queue/nr_zones")
            .ok_or_else(|| not_ready("nr_zones"))?;
        let max_open = self.read_u64(device, "queue/max_open_zones").unwrap_or(0) as u32;

        let zone_size = zone_sectors * SYSFS_SECTOR;
        let zone_capacity = self.zone_capacity(device, zone_size)?;

        DeviceProfile::zoned(device, zone_count, zone_size, zone_capacity, max_open, sector_size)
    }
}

/// Extract the capacity (in 512-byte sectors) of the first zone in a `blkzone report`
///
/// Report lines look like:
///
/// ```text
///   start: 0x000000000, len 0x080000, cap 0x043500, wptr 0x000000 reset:0 non-seq:0, zcond: 1(em) [type: 2(SEQ_WRITE_REQUIRED)]
/// ```
pub fn parse_zone_capacity_sectors(report: &str) -> Option<u64> {
    report.lines().find_map(|line| {
        let rest = &line[line.find("cap ")? + 4..];
        let hex = rest.split(|c: char| c == ',' || c.is_whitespace()).next()?;
        let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok()
    })
}

/// Device size via BLKGETSIZE64 on the device node
fn ioctl_size(device: &Path) -> std::io::Result<u64> {
    let file = fs::File::open(device)?;
    let mut size: u64 = 0;
    let result = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };
    if result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(size)
}

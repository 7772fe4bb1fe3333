//! Device capability facts
//!
//! A [`DeviceProfile`] is an immutable snapshot of what the target device looks like,
//! taken once at the start of a sweep. The planner only reads it; nothing in the
//! pipeline mutates it.
//!
//! # Zoned vs conventional
//!
//! Zoned devices split their address space into append-only zones. Each zone has a
//! nominal size and a usable capacity that may be smaller. Conventional devices have
//! no zones; the zone fields are zero and the planner works from the total size and
//! a capacity fraction instead.

pub mod checks;
pub mod reset;
pub mod sysfs;

use crate::error::SweepError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use reset::DeviceReset;
pub use sysfs::SysfsProbe;

/// Immutable snapshot of device capability and capacity facts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Device node the profile was taken from
    pub device: PathBuf,
    pub is_zoned: bool,
    /// Number of zones (0 if not zoned)
    pub zone_count: u64,
    pub zone_size_bytes: u64,
    /// Usable bytes per zone, never larger than `zone_size_bytes`
    pub zone_capacity_bytes: u64,
    /// Concurrently open zone limit (0 = unlimited / not applicable)
    pub max_open_zones: u32,
    pub sector_size_bytes: u32,
    pub total_size_bytes: u64,
}

impl DeviceProfile {
    /// Profile of a conventional, randomly writable block range
    pub fn conventional(device: impl Into<PathBuf>, total_size_bytes: u64, sector_size_bytes: u32) -> Self {
        Self {
            device: device.into(),
            is_zoned: false,
            zone_count: 0,
            zone_size_bytes: 0,
            zone_capacity_bytes: 0,
            max_open_zones: 0,
            sector_size_bytes,
            total_size_bytes,
        }
    }

    /// Profile of a zoned device
    ///
    /// Fails with `DeviceNotReady` when the zone metadata is inconsistent: no zones,
    /// zero zone size, or a capacity larger than the zone size.
    pub fn zoned(
        device: impl Into<PathBuf>,
        zone_count: u64,
        zone_size_bytes: u64,
        zone_capacity_bytes: u64,
        max_open_zones: u32,
        sector_size_bytes: u32,
    ) -> Result<Self> {
        let device = device.into();
        let not_ready = |reason: String| SweepError::DeviceNotReady {
            device: device.display().to_string(),
            reason,
        };

        if zone_count == 0 || zone_size_bytes == 0 {
            return Err(not_ready(format!(
                "zone metadata missing (zones={}, zone_size={})",
                zone_count, zone_size_bytes
            ))
            .into());
        }
        if zone_capacity_bytes == 0 || zone_capacity_bytes > zone_size_bytes {
            return Err(not_ready(format!(
                "zone capacity {} is not within (0, {}]",
                zone_capacity_bytes, zone_size_bytes
            ))
            .into());
        }

        Ok(Self {
            device,
            is_zoned: true,
            zone_count,
            zone_size_bytes,
            zone_capacity_bytes,
            max_open_zones,
            sector_size_bytes,
            total_size_bytes: zone_count * zone_size_bytes,
        })
    }

    /// Bytes available for preparation plus measurement
    ///
    /// Zoned devices can only use the zone capacity of every zone. Conventional devices
    /// use `capacity_fraction` of their total size.
    pub fn usable_capacity(&self, capacity_fraction: f64) -> u64 {
        if self.is_zoned {
            self.zone_count * self.zone_capacity_bytes
        } else {
            (self.total_size_bytes as f64 * capacity_fraction).floor() as u64
        }
    }

    /// Whether the device enforces a bounded number of open zones
    pub fn has_open_zone_limit(&self) -> bool {
        self.is_zoned && self.max_open_zones > 0
    }

    /// Short device name (`nvme0n1` for `/dev/nvme0n1`)
    pub fn device_name(&self) -> String {
        device_name(&self.device)
    }
}

/// Strip the `/dev/` prefix from a device path
pub fn device_name(device: &Path) -> String {
    device
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| device.display().to_string())
}

/// Read-only oracle supplying device capability facts
pub trait CapabilityProbe {
    /// Query the device; pure, never mutates it
    fn probe(&self, device: &Path) -> Result<DeviceProfile>;
}

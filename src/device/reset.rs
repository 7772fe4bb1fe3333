//! Destructive device reset
//!
//! Before a write repetition the target region must be returned to a clean state:
//! `blkzone reset` rewinds every write pointer on a zoned device, `blkdiscard`
//! trims a conventional one. Stale allocation state left by an earlier point would
//! otherwise bias the next measurement.

use super::DeviceProfile;
use crate::error::SweepError;
use crate::executor::runner::{CommandRunner, Invocation};
use crate::Result;

/// Resets a device through a [`CommandRunner`]
pub struct DeviceReset<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> DeviceReset<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Reset tool for a zoned or conventional device
    pub fn program(zoned: bool) -> &'static str {
        if zoned {
            "blkzone"
        } else {
            "blkdiscard"
        }
    }

    /// Command that resets the whole device described by `profile`
    pub fn invocation(profile: &DeviceProfile) -> Invocation {
        let device = profile.device.display().to_string();
        let invocation = Invocation::new(Self::program(profile.is_zoned));
        if profile.is_zoned {
            invocation.arg("reset").arg(device)
        } else {
            invocation.arg(device)
        }
    }

    /// Reset the device; fails with `DiscardFailure`
    pub fn reset(&self, profile: &DeviceProfile) -> Result<()> {
        let invocation = Self::invocation(profile);
        tracing::debug!(command = %invocation.command_line(), "resetting device");

        let output = self.runner.run(&invocation).map_err(|e| SweepError::DiscardFailure {
            device: profile.device.display().to_string(),
            reason: e.to_string(),
        })?;

        if !output.success() {
            return Err(SweepError::DiscardFailure {
                device: profile.device.display().to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    invocation.program,
                    output.exit_code,
                    output.stderr.trim()
                ),
            }
            .into());
        }

        Ok(())
    }
}

//! Failure taxonomy
//!
//! Every failure the sweep pipeline distinguishes is a variant of [`SweepError`].
//! Errors travel through the crate as `anyhow::Error` (see [`crate::Result`]); the
//! coordinator downcasts to `SweepError` to decide whether a failure aborts the run
//! or only leaves a gap in one record.
//!
//! | Variant               | Fatal?                                   |
//! |-----------------------|------------------------------------------|
//! | `PreconditionFailure` | yes, before any destructive action       |
//! | `DeviceUnavailable`   | yes, no plan without capability facts    |
//! | `DeviceNotReady`      | yes                                      |
//! | `InvalidConfig`       | yes                                      |
//! | `DiscardFailure`      | yes for the point, aborts the benchmark  |
//! | `ExternalToolFailure` | per point, the sweep continues           |
//! | `ParseFailure`        | no, the repetition is excluded           |

use thiserror::Error;

/// Typed failures of the sweep pipeline
#[derive(Debug, Error)]
pub enum SweepError {
    /// Device mounted, malformed device name, missing external tool, ...
    #[error("precondition failed: {0}")]
    PreconditionFailure(String),

    /// The device could not be queried at all
    #[error("device {device} is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// Zoned metadata was required but is absent or inconsistent
    #[error("device {device} is not ready: {reason}")]
    DeviceNotReady { device: String, reason: String },

    /// The load generator (or another external tool) exited non-zero
    #[error("{tool} exited with status {exit_code}")]
    ExternalToolFailure { tool: String, exit_code: i32 },

    /// The destructive pre-write reset failed
    #[error("failed to reset {device}: {reason}")]
    DiscardFailure { device: String, reason: String },

    /// A raw result document could not be interpreted
    #[error("malformed result document {source_name}: {reason}")]
    ParseFailure { source_name: String, reason: String },

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SweepError {
    /// Whether the pipeline may continue with the remaining points after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SweepError::ExternalToolFailure { .. } | SweepError::ParseFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let tool = SweepError::ExternalToolFailure { tool: "fio".into(), exit_code: 1 };
        assert!(tool.is_recoverable());

        let discard = SweepError::DiscardFailure {
            device: "/dev/nvme0n1".into(),
            reason: "exit 1".into(),
        };
        assert!(!discard.is_recoverable());
        assert!(!SweepError::PreconditionFailure("mounted".into()).is_recoverable());
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = SweepError::ExternalToolFailure { tool: "fio".into(), exit_code: 3 }.into();
        let err = err.context("point 01-read-0001-0001-000004096-001of001");

        match err.downcast_ref::<SweepError>() {
            Some(SweepError::ExternalToolFailure { exit_code, .. }) => assert_eq!(*exit_code, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_display_messages() {
        let err = SweepError::DeviceNotReady {
            device: "/dev/nvme1n2".into(),
            reason: "missing queue/nr_zones".into(),
        };
        assert_eq!(err.to_string(), "device /dev/nvme1n2 is not ready: missing queue/nr_zones");
    }
}

//! zbdsweep - fio benchmark sweeps for zoned and conventional block devices
//!
//! zbdsweep plans parameter sweeps (operation, job count, queue depth, block size),
//! runs fio for every point, one point at a time, and folds the raw result documents
//! into CSV reports.
//!
//! # Architecture
//!
//! - **device**: capability probe (zone geometry, open-zone limit), reset, preconditions
//! - **plan**: deterministic, lazily expanded sweep points and their result file names
//! - **executor**: fio job construction and the external command boundary
//! - **stats**: raw document parsing, repetition folding, disk-stats sampling
//! - **bench**: the benchmark variants built on top of the planner
//! - **coordinator**: the single control loop and the failure policy
//! - **output**: CSV reports, run manifest, console tables

pub mod bench;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod executor;
pub mod output;
pub mod plan;
pub mod stats;

// Re-export commonly used types
pub use config::SweepConfig;
pub use device::DeviceProfile;
pub use error::SweepError;

/// Result type used throughout zbdsweep
pub type Result<T> = anyhow::Result<T>;

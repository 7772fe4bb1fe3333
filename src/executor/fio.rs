//! Load generator invocation
//!
//! Deterministic translation of a [`WorkloadPoint`] plus the device and run context
//! into fio arguments. Device quirks (open-zone ceilings, SPDK bdevs) are injected
//! here and nowhere else.

use super::runner::{Invocation, CONTAINER_OUTPUT_DIR};
use crate::config::{ContainerMode, ExecutionContext};
use crate::device::DeviceProfile;
use crate::plan::{Operation, WorkloadPoint};
use crate::stats::percentile_list;
use std::path::Path;

/// One `--key[=value]` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FioParam {
    pub key: String,
    pub value: Option<String>,
}

impl FioParam {
    fn arg(&self) -> String {
        match self.value {
            Some(ref v) => format!("--{}={}", self.key, v),
            None => format!("--{}", self.key),
        }
    }
}

/// Ordered fio parameters for one point
///
/// Global options come first; a rate-limited mixed point adds a writer and a reader job,
/// each starting at its `name` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FioJob {
    pub params: Vec<FioParam>,
}

impl FioJob {
    fn set(&mut self, key: &str, value: impl ToString) {
        self.params.push(FioParam {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
    }

    fn flag(&mut self, key: &str) {
        self.params.push(FioParam {
            key: key.to_string(),
            value: None,
        });
    }

    /// First value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.value.as_deref())
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.iter().any(|p| p.key == key)
    }

    pub fn args(&self) -> Vec<String> {
        self.params.iter().map(FioParam::arg).collect()
    }

    /// Build the parameters for `point`
    pub fn for_point(point: &WorkloadPoint, profile: &DeviceProfile, ctx: &ExecutionContext, job_name: &str) -> Self {
        let mut job = FioJob::default();

        let ioengine = match ctx.spdk {
            Some(ref spdk) => spdk.ioengine(),
            None if point.operation.is_synchronous() => "psync".to_string(),
            None => "io_uring".to_string(),
        };
        job.set("ioengine", ioengine);
        job.set("direct", 1);
        job.set("zonemode", if profile.is_zoned { "zbd" } else { "none" });
        job.set("output-format", ctx.output_format.fio_name());
        match ctx.spdk {
            Some(ref spdk) => {
                job.set("filename", &spdk.bdev);
                job.set("spdk_json_conf", spdk.json_conf.display());
                job.set("thread", 1);
            }
            None => job.set("filename", profile.device.display()),
        }
        if profile.is_zoned && profile.has_open_zone_limit() {
            job.set("max_open_zones", profile.max_open_zones);
            job.set("job_max_open_zone", 1);
        }
        job.set("percentile_list", percentile_list());

        if !point.is_prep() && ctx.is_time_based() {
            job.flag("time_based");
            job.set("ramp_time", ctx.ramp_time_secs);
            job.set("runtime", ctx.runtime_secs);
        }

        match (point.operation, point.write_rate_limit) {
            (Operation::MixedReadWrite, Some(rate)) => {
                let writer = ctx.mixed_writer;
                job.set("name", format!("{}-writer", job_name));
                job.set("rw", "randwrite");
                job.set("bs", writer.block_size);
                job.set("iodepth", writer.queue_depth);
                job.set("rate", format!(",{}", rate));
                job.set("size", point.size_bytes);

                job.set("name", format!("{}-reader", job_name));
                job.set("rw", "randread");
                job.set("bs", point.block_size);
                job.set("numjobs", point.job_count());
                job.set("iodepth", point.per_job_depth());
                job.set("offset_increment", point.offset_increment_bytes);
                job.set("size", point.size_bytes);
            }
            (operation, rate) => {
                job.flag("group_reporting");
                job.set("name", job_name);
                job.set("rw", operation.fio_name());
                if operation == Operation::MixedReadWrite {
                    job.set("rwmixread", ctx.mixed_writer.rwmixread);
                }
                job.set("bs", point.block_size);
                job.set("numjobs", point.job_count());
                job.set("iodepth", point.per_job_depth());
                job.set("offset_increment", point.offset_increment_bytes);
                job.set("size", point.size_bytes);
                if ctx.write_passes > 1 && operation.is_write() && !point.is_prep() {
                    job.set("io_size", point.size_bytes.saturating_mul(u64::from(ctx.write_passes)));
                }
                if let Some(rate) = rate {
                    job.set("rate", format!(",{}", rate));
                }
            }
        }

        job
    }
}

/// Output path handed to fio; inside the container the run directory is mounted
/// at a fixed location
pub fn output_argument(ctx: &ExecutionContext, log_path: &Path) -> String {
    if ctx.container != ContainerMode::Docker {
        return log_path.display().to_string();
    }
    match log_path.strip_prefix(&ctx.output_root) {
        Ok(relative) => Path::new(CONTAINER_OUTPUT_DIR).join(relative).display().to_string(),
        Err(_) => log_path.display().to_string(),
    }
}

/// Complete load generator invocation writing to `log_path`
pub fn invocation(job: &FioJob, ctx: &ExecutionContext, log_path: &Path) -> Invocation {
    Invocation::new(ctx.fio_binary.clone())
        .args(job.args())
        .arg("--output")
        .arg(output_argument(ctx, log_path))
        .containerized(true)
}

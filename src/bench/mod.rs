//! Benchmark variants
//!
//! Every benchmark is a [`Benchmark`] strategy: it plans its points for a device,
//! runs them through a [`WorkloadExecutor`], folds the raw documents and writes its
//! report. The coordinator drives all of them the same way.
//!
//! | Id                              | Variant                          |
//! |---------------------------------|----------------------------------|
//! | `fio_zone_throughput_avg_lat`   | [`sweep::ThroughputSweep`]       |
//! | `fio_steady_state_performance`  | [`steady_state::SteadyState`]    |
//! | `fio_zone_mixed`                | [`mixed::MixedLoad`]             |
//! | `fio_zone_writes`               | [`zone_writes::ZoneWrites`]      |
//! | `fio_zone_randr_seqw_seqr_rrsw` | [`randr_seqw::PhasedLoad`]       |

pub mod mixed;
pub mod randr_seqw;
pub mod steady_state;
pub mod sweep;
pub mod zone_writes;

use crate::config::{ExecutionContext, SweepConfig};
use crate::device::checks::Scheduler;
use crate::device::DeviceProfile;
use crate::error::SweepError;
use crate::executor::WorkloadExecutor;
use crate::output::ReportWriter;
use crate::plan::WorkloadPoint;
use crate::stats::{AggregatedRecord, RawResultDocument, ResultAggregator};
use crate::Result;
use std::path::{Path, PathBuf};

pub use mixed::MixedLoad;
pub use randr_seqw::PhasedLoad;
pub use steady_state::SteadyState;
pub use sweep::ThroughputSweep;
pub use zone_writes::ZoneWrites;

/// One benchmark variant
pub trait Benchmark {
    /// Stable identifier, also the name of the benchmark's results directory
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn preferred_scheduler(&self) -> Scheduler {
        Scheduler::None
    }

    /// Tools the load generator side needs (inside the container in docker mode)
    fn required_tools(&self) -> Vec<&'static str> {
        vec!["fio"]
    }

    /// Run context for this benchmark, derived from the shared one
    fn context(&self, base: &ExecutionContext) -> ExecutionContext;

    /// Ordered points for `profile`
    fn plan(&self, profile: &DeviceProfile) -> Vec<WorkloadPoint>;

    fn execute(&self, executor: &WorkloadExecutor<'_>, point: &WorkloadPoint) -> Result<RawResultDocument> {
        executor.execute(point)
    }

    /// Fold one repetition; `None` raw documents count as missing
    fn aggregate(
        &self,
        aggregator: &mut ResultAggregator,
        point: &WorkloadPoint,
        raw: Option<&RawResultDocument>,
    ) -> Option<AggregatedRecord> {
        aggregator.aggregate(point, raw)
    }

    /// Write the benchmark's report files into `result_dir`
    fn report(&self, records: &[AggregatedRecord], result_dir: &Path) -> Result<Vec<PathBuf>> {
        let path = ReportWriter::new(report_path(self.id(), result_dir)).write(records)?;
        Ok(vec![path])
    }
}

/// `<result_dir>/<id>.csv`
pub fn report_path(id: &str, result_dir: &Path) -> PathBuf {
    result_dir.join(format!("{}.csv", id))
}

/// All benchmarks in their default order
pub fn registry(config: &SweepConfig) -> Vec<Box<dyn Benchmark>> {
    vec![
        Box::new(ThroughputSweep::new(config)),
        Box::new(SteadyState::new(config)),
        Box::new(MixedLoad::new(config)),
        Box::new(ZoneWrites::new(config)),
        Box::new(PhasedLoad::new(config)),
    ]
}

/// Benchmarks named in `names` (all when empty), in registry order
pub fn select(config: &SweepConfig, names: &[String]) -> Result<Vec<Box<dyn Benchmark>>> {
    let all = registry(config);
    if let Some(unknown) = names.iter().find(|n| !all.iter().any(|b| b.id() == n.as_str())) {
        let valid: Vec<&str> = all.iter().map(|b| b.id()).collect();
        return Err(SweepError::InvalidConfig(format!(
            "unknown benchmark '{}', available: {}",
            unknown,
            valid.join(", ")
        ))
        .into());
    }

    Ok(all
        .into_iter()
        .filter(|b| names.is_empty() || names.iter().any(|n| n == b.id()))
        .collect())
}

/// Print the benchmark list
pub fn list(config: &SweepConfig) {
    println!("Available benchmarks:");
    for bench in registry(config) {
        println!("  {:<32} {}", bench.id(), bench.description());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids() {
        let ids: Vec<&str> = registry(&SweepConfig::default()).iter().map(|b| b.id()).collect();
        assert_eq!(
            ids,
            vec![
                "fio_zone_throughput_avg_lat",
                "fio_steady_state_performance",
                "fio_zone_mixed",
                "fio_zone_writes",
                "fio_zone_randr_seqw_seqr_rrsw"
            ]
        );
    }

    #[test]
    fn test_select_subset_keeps_registry_order() {
        let names = vec!["fio_zone_mixed".to_string(), "fio_zone_throughput_avg_lat".to_string()];
        let selected = select(&SweepConfig::default(), &names).unwrap();
        let ids: Vec<&str> = selected.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec!["fio_zone_throughput_avg_lat", "fio_zone_mixed"]);

        assert_eq!(select(&SweepConfig::default(), &[]).unwrap().len(), 5);
    }

    #[test]
    fn test_select_unknown() {
        let err = match select(&SweepConfig::default(), &["fio_nope".to_string()]) {
            Ok(_) => panic!("unknown benchmark accepted"),
            Err(e) => e,
        };
        assert!(matches!(
            err.downcast_ref::<SweepError>(),
            Some(SweepError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_mixed_prefers_mq_deadline() {
        let config = SweepConfig::default();
        assert_eq!(MixedLoad::new(&config).preferred_scheduler(), Scheduler::MqDeadline);
        assert_eq!(ThroughputSweep::new(&config).preferred_scheduler(), Scheduler::None);
    }
}

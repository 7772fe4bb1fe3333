//! Repetition aggregation
//!
//! Folds the repetitions of each sweep point into one [`AggregatedRecord`]. The
//! aggregator keeps an accumulator per [`PointKey`]; every repetition either adds its
//! sample or is recorded as missing (tool failure, unparseable output). Once every
//! repetition index of a key has been accounted for, the sums are divided by the
//! number of samples actually folded and the record is emitted.
//!
//! Sums are exact integers, so the feeding order of repetitions does not change the
//! result.
//!
//! # Example
//!
//! ```
//! use zbdsweep::stats::aggregator::{RepetitionSample, ResultAggregator};
//! use zbdsweep::plan::{Operation, PointKey};
//!
//! let key = PointKey {
//!     operation: Operation::RandomRead,
//!     parallelism: 1,
//!     queue_depth: 4,
//!     block_size: 4096,
//!     write_rate_limit: None,
//! };
//! let sample = |lat| RepetitionSample { throughput_bytes_per_sec: 1000, mean_latency_us: lat, percentiles_us: [lat; 18] };
//!
//! let mut aggregator = ResultAggregator::new();
//! assert!(aggregator.fold(key, 1, 2, Some(sample(100))).is_none());
//! let record = aggregator.fold(key, 2, 2, Some(sample(200))).unwrap();
//! assert_eq!(record.mean_latency_us, 150);
//! ```

use super::{JobMetrics, RawResultDocument};
use crate::plan::{Operation, PointKey, WorkloadPoint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Averaged result of one sweep point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub key: PointKey,
    pub mean_latency_us: u64,
    pub throughput_bytes_per_sec: u64,
    pub percentiles_us: [u64; 18],
    /// Repetitions that contributed
    pub repetitions: u32,
}

/// Canonical metrics of one repetition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionSample {
    pub throughput_bytes_per_sec: u64,
    pub mean_latency_us: u64,
    pub percentiles_us: [u64; 18],
}

impl RepetitionSample {
    /// Latency of the direction the operation measures; throughput over both directions
    ///
    /// Mixed loads report the read latency seen under the concurrent writes.
    pub fn from_metrics(operation: Operation, metrics: &JobMetrics) -> Self {
        let latency = if operation.is_write() {
            &metrics.write
        } else {
            &metrics.read
        };

        let bytes = u128::from(metrics.read.io_bytes) + u128::from(metrics.write.io_bytes);
        let runtime_ms = metrics.read.runtime_ms.max(metrics.write.runtime_ms);

        Self {
            throughput_bytes_per_sec: throughput(bytes, runtime_ms),
            mean_latency_us: latency.mean_latency_us,
            percentiles_us: latency.percentiles_us,
        }
    }
}

/// Bytes per second; zero when no time elapsed
fn throughput(bytes: u128, runtime_ms: u64) -> u64 {
    if runtime_ms == 0 {
        return 0;
    }
    u64::try_from(bytes * 1000 / u128::from(runtime_ms)).unwrap_or(u64::MAX)
}

/// Running state of one key
#[derive(Debug, Default)]
struct Accumulator {
    repetition_count: u32,
    /// Indices accounted for, folded or missing
    seen: BTreeSet<u32>,
    missing: Vec<u32>,
    folded: u32,
    throughput: u128,
    latency: u128,
    percentiles: [u128; 18],
}

impl Accumulator {
    fn add(&mut self, sample: &RepetitionSample) {
        self.folded += 1;
        self.throughput += u128::from(sample.throughput_bytes_per_sec);
        self.latency += u128::from(sample.mean_latency_us);
        for (sum, value) in self.percentiles.iter_mut().zip(sample.percentiles_us.iter()) {
            *sum += u128::from(*value);
        }
    }

    fn is_complete(&self) -> bool {
        self.seen.len() as u32 >= self.repetition_count
    }

    /// Rounded mean over the folded samples
    fn finish(self, key: PointKey) -> Option<AggregatedRecord> {
        if self.folded == 0 {
            return None;
        }
        let n = u128::from(self.folded);
        let mean = |sum: u128| u64::try_from((sum + n / 2) / n).unwrap_or(u64::MAX);

        let mut percentiles_us = [0u64; 18];
        for (slot, sum) in percentiles_us.iter_mut().zip(self.percentiles.iter()) {
            *slot = mean(*sum);
        }

        Some(AggregatedRecord {
            key,
            mean_latency_us: mean(self.latency),
            throughput_bytes_per_sec: mean(self.throughput),
            percentiles_us,
            repetitions: self.folded,
        })
    }
}

/// Keyed fold over repetitions
#[derive(Debug, Default)]
pub struct ResultAggregator {
    pending: HashMap<PointKey, Accumulator>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one executed repetition
    ///
    /// `raw` is `None` when the repetition produced no document. Unparseable documents
    /// are logged and counted as missing. Preparation points are ignored.
    pub fn aggregate(
        &mut self,
        point: &WorkloadPoint,
        raw: Option<&RawResultDocument>,
    ) -> Option<AggregatedRecord> {
        if point.is_prep() {
            return None;
        }

        let sample = raw.and_then(|doc| match doc.parse() {
            Ok(metrics) => Some(RepetitionSample::from_metrics(point.operation, &metrics)),
            Err(e) => {
                tracing::warn!(
                    point = %point.key(),
                    repetition = point.repetition_index,
                    "skipping repetition: {}",
                    e
                );
                None
            }
        });

        self.fold(point.key(), point.repetition_index, point.repetition_count, sample)
    }

    /// Fold a sample (or a missing repetition) into the accumulator of `key`
    pub fn fold(
        &mut self,
        key: PointKey,
        repetition_index: u32,
        repetition_count: u32,
        sample: Option<RepetitionSample>,
    ) -> Option<AggregatedRecord> {
        let acc = self.pending.entry(key).or_insert_with(|| Accumulator {
            repetition_count,
            ..Default::default()
        });

        if repetition_count != acc.repetition_count {
            tracing::warn!(
                point = %key,
                expected = acc.repetition_count,
                got = repetition_count,
                "repetition count differs from earlier repetitions; ignoring"
            );
            return None;
        }
        if repetition_index == 0 || repetition_index > repetition_count {
            tracing::warn!(point = %key, repetition = repetition_index, "repetition index out of range");
            return None;
        }
        if !acc.seen.insert(repetition_index) {
            tracing::warn!(point = %key, repetition = repetition_index, "duplicate repetition ignored");
            return None;
        }

        match sample {
            Some(ref s) => acc.add(s),
            None => acc.missing.push(repetition_index),
        }

        if !acc.is_complete() {
            return None;
        }

        let acc = self.pending.remove(&key)?;
        if !acc.missing.is_empty() {
            tracing::warn!(
                point = %key,
                missing = ?acc.missing,
                "record averaged over {} of {} repetitions",
                acc.folded,
                acc.repetition_count
            );
        }
        let record = acc.finish(key);
        if record.is_none() {
            tracing::warn!(point = %key, "no valid repetitions; no record emitted");
        }
        record
    }

    /// Keys still waiting for repetitions
    pub fn pending_keys(&self) -> Vec<PointKey> {
        let mut keys: Vec<PointKey> = self.pending.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Drop unfinished accumulators, warning about each
    pub fn finish(self) -> Vec<PointKey> {
        let keys = self.pending_keys();
        for key in &keys {
            tracing::warn!(point = %key, "incomplete point: not all repetitions were run");
        }
        keys
    }
}

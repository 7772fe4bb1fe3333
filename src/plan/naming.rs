//! Raw result file names
//!
//! Every repetition writes one log whose name encodes the point it measured.
//! All numeric fields are zero-padded and prefixed with the operation's canonical
//! ordinal, so a sorted directory listing reproduces the plan order:
//!
//! ```text
//! 00-read-0000-prep.log
//! 00-read-0001-0001-000004096-001of003.log
//! 04-randrw-0001-0004-000004096-w000026214400-001of001.log
//! ```

use super::{Operation, PointKey, PointKind, ResetPolicy, WorkloadPoint};
use crate::error::SweepError;
use std::fmt;
use std::str::FromStr;

pub const LOG_EXTENSION: &str = "log";

/// Parsed or generated raw result file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFileName {
    /// Fill ahead of `operation`
    Prep { operation: Operation },
    Measured {
        key: PointKey,
        repetition_index: u32,
        repetition_count: u32,
    },
}

impl ResultFileName {
    pub fn for_point(point: &WorkloadPoint) -> Self {
        match point.kind {
            PointKind::Prep { target } => ResultFileName::Prep { operation: target },
            PointKind::Measured => ResultFileName::Measured {
                key: point.key(),
                repetition_index: point.repetition_index,
                repetition_count: point.repetition_count,
            },
        }
    }

    pub fn is_prep(&self) -> bool {
        matches!(self, ResultFileName::Prep { .. })
    }

    /// Point identity recovered from a measured log name
    ///
    /// Sizes and offsets are not encoded in names and come back as 0.
    pub fn measured_point(&self) -> Option<WorkloadPoint> {
        match *self {
            ResultFileName::Prep { .. } => None,
            ResultFileName::Measured {
                key,
                repetition_index,
                repetition_count,
            } => Some(WorkloadPoint {
                kind: PointKind::Measured,
                operation: key.operation,
                parallelism: key.parallelism,
                queue_depth: key.queue_depth,
                block_size: key.block_size,
                repetition_index,
                repetition_count,
                size_bytes: 0,
                offset_increment_bytes: 0,
                reset: ResetPolicy::Preserve,
                write_rate_limit: key.write_rate_limit,
            }),
        }
    }
}

impl fmt::Display for ResultFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultFileName::Prep { operation } => write!(
                f,
                "{:02}-{}-0000-prep.{}",
                operation.ordinal(),
                operation.fio_name(),
                LOG_EXTENSION
            ),
            ResultFileName::Measured {
                key,
                repetition_index,
                repetition_count,
            } => {
                write!(
                    f,
                    "{:02}-{}-{:04}-{:04}-{:09}",
                    key.operation.ordinal(),
                    key.operation.fio_name(),
                    key.parallelism,
                    key.queue_depth,
                    key.block_size
                )?;
                if let Some(rate) = key.write_rate_limit {
                    write!(f, "-w{:012}", rate)?;
                }
                write!(
                    f,
                    "-{:03}of{:03}.{}",
                    repetition_index, repetition_count, LOG_EXTENSION
                )
            }
        }
    }
}

fn malformed(name: &str, reason: &str) -> SweepError {
    SweepError::ParseFailure {
        source_name: name.to_string(),
        reason: format!("not a raw result file name: {}", reason),
    }
}

fn number<T: FromStr>(name: &str, field: &str, what: &str) -> Result<T, SweepError> {
    field
        .parse()
        .map_err(|_| malformed(name, &format!("bad {} '{}'", what, field)))
}

impl FromStr for ResultFileName {
    type Err = SweepError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let stem = name
            .strip_suffix(&format!(".{}", LOG_EXTENSION))
            .ok_or_else(|| malformed(name, "missing .log extension"))?;
        let parts: Vec<&str> = stem.split('-').collect();
        if parts.len() < 4 {
            return Err(malformed(name, "too few fields"));
        }

        let ordinal: usize = number(name, parts[0], "ordinal")?;
        let operation = Operation::ALL
            .iter()
            .copied()
            .find(|op| op.fio_name() == parts[1])
            .ok_or_else(|| malformed(name, &format!("unknown operation '{}'", parts[1])))?;
        if operation.ordinal() != ordinal {
            return Err(malformed(name, "ordinal does not match operation"));
        }

        if parts.len() == 4 && parts[2] == "0000" && parts[3] == "prep" {
            return Ok(ResultFileName::Prep { operation });
        }

        let (write_rate_limit, tail) = match parts.len() {
            6 => (None, parts[5]),
            7 => {
                let rate = parts[5]
                    .strip_prefix('w')
                    .ok_or_else(|| malformed(name, "bad write rate segment"))?;
                (Some(number(name, rate, "write rate")?), parts[6])
            }
            _ => return Err(malformed(name, "unexpected field count")),
        };

        let (index, count) = tail
            .split_once("of")
            .ok_or_else(|| malformed(name, "missing repetition segment"))?;
        let repetition_index: u32 = number(name, index, "repetition index")?;
        let repetition_count: u32 = number(name, count, "repetition count")?;
        if repetition_index == 0 || repetition_index > repetition_count {
            return Err(malformed(name, "repetition index out of range"));
        }

        Ok(ResultFileName::Measured {
            key: PointKey {
                operation,
                parallelism: number(name, parts[2], "parallelism")?,
                queue_depth: number(name, parts[3], "queue depth")?,
                block_size: number(name, parts[4], "block size")?,
                write_rate_limit,
            },
            repetition_index,
            repetition_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(operation: Operation, parallelism: u32, queue_depth: u32, block_size: u64) -> PointKey {
        PointKey {
            operation,
            parallelism,
            queue_depth,
            block_size,
            write_rate_limit: None,
        }
    }

    #[test]
    fn test_measured_name() {
        let name = ResultFileName::Measured {
            key: key(Operation::SequentialRead, 1, 8, 4096),
            repetition_index: 2,
            repetition_count: 3,
        };
        assert_eq!(name.to_string(), "00-read-0001-0008-000004096-002of003.log");
        assert_eq!(name.to_string().parse::<ResultFileName>().unwrap(), name);
    }

    #[test]
    fn test_prep_name() {
        let name = ResultFileName::Prep {
            operation: Operation::RandomRead,
        };
        assert_eq!(name.to_string(), "01-randread-0000-prep.log");
        assert!(name.to_string().parse::<ResultFileName>().unwrap().is_prep());
    }

    #[test]
    fn test_rate_limited_name() {
        let mut k = key(Operation::MixedReadWrite, 1, 4, 4096);
        k.write_rate_limit = Some(25 * 1024 * 1024);
        let name = ResultFileName::Measured {
            key: k,
            repetition_index: 1,
            repetition_count: 1,
        };
        assert_eq!(name.to_string(), "04-randrw-0001-0004-000004096-w000026214400-001of001.log");
        assert_eq!(name.to_string().parse::<ResultFileName>().unwrap(), name);
    }

    #[test]
    fn test_sorted_listing_matches_plan_order() {
        let plan_order = vec![
            ResultFileName::Prep { operation: Operation::SequentialRead },
            ResultFileName::Measured {
                key: key(Operation::SequentialRead, 1, 2, 4096),
                repetition_index: 1,
                repetition_count: 2,
            },
            ResultFileName::Measured {
                key: key(Operation::SequentialRead, 1, 2, 4096),
                repetition_index: 2,
                repetition_count: 2,
            },
            ResultFileName::Measured {
                key: key(Operation::SequentialRead, 1, 2, 131072),
                repetition_index: 1,
                repetition_count: 2,
            },
            ResultFileName::Measured {
                key: key(Operation::SequentialRead, 1, 16, 4096),
                repetition_index: 1,
                repetition_count: 2,
            },
            ResultFileName::Measured {
                key: key(Operation::SequentialWrite, 8, 8, 4096),
                repetition_index: 1,
                repetition_count: 2,
            },
        ];

        let mut names: Vec<String> = plan_order.iter().map(|n| n.to_string()).collect();
        let expected = names.clone();
        names.reverse();
        names.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("00-read-0001-0001-000004096-001of001.txt".parse::<ResultFileName>().is_err());
        assert!("03-read-0001-0001-000004096-001of001.log".parse::<ResultFileName>().is_err());
        assert!("00-trim-0001-0001-000004096-001of001.log".parse::<ResultFileName>().is_err());
        assert!("00-read-0001-0001-000004096-004of003.log".parse::<ResultFileName>().is_err());
        assert!("00-read-0001.log".parse::<ResultFileName>().is_err());
    }

    #[test]
    fn test_measured_point_from_name() {
        let name: ResultFileName = "04-randrw-0001-0004-000004096-w000026214400-002of003.log".parse().unwrap();
        let point = name.measured_point().unwrap();
        assert_eq!(point.operation, Operation::MixedReadWrite);
        assert_eq!(point.write_rate_limit, Some(26_214_400));
        assert_eq!((point.repetition_index, point.repetition_count), (2, 3));
        assert_eq!(point.file_name(), name);

        let prep: ResultFileName = "00-read-0000-prep.log".parse().unwrap();
        assert!(prep.measured_point().is_none());
    }
}

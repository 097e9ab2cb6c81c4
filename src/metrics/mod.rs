//! Metric extraction pipeline.
//!
//! An ordered list of independently-implemented, named calculators, each
//! given the full event buffer of one healthy cycle. The evaluation order
//! is fixed and doubles as the CSV column order. Calculators never observe
//! each other's results; when any of them fails, the cycle's whole output
//! row is skipped and processing continues with the next cycle.

pub mod calculators;

use std::fmt;

use thiserror::Error;

use crate::dialect::MarkerSet;
use crate::segmenter::Cycle;

/// Errors that can occur during metric extraction.
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("{metric}: incomplete interval in cycle {seqno} (lines {lno_start} to {lno_end}): {detail}")]
    IncompleteInterval {
        metric: &'static str,
        seqno: u64,
        lno_start: u64,
        lno_end: u64,
        detail: &'static str,
    },
}

impl MetricError {
    /// Incomplete-interval error for the given calculator and cycle.
    pub fn incomplete(metric: &'static str, cycle: &Cycle, detail: &'static str) -> Self {
        Self::IncompleteInterval {
            metric,
            seqno: cycle.seqno,
            lno_start: cycle.lno_start,
            lno_end: cycle.lno_last(),
            detail,
        }
    }
}

/// A single extracted metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Duration in seconds.
    Seconds(f64),
    /// Presence flag.
    Flag(bool),
    /// Occurrence count.
    Count(u64),
    /// One of a small fixed label set.
    Label(&'static str),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{s:.3}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Label(l) => f.write_str(l),
        }
    }
}

/// Shutdown classification of a cycle, shared with the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownType {
    /// The firmware saved a RAM backup before powering down.
    WithBackup,
    /// Plain power-down with no backup.
    NoBackup,
}

impl ShutdownType {
    /// Canonical label used in CSV output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WithBackup => "With Backup",
            Self::NoBackup => "No Backup",
        }
    }
}

/// One named metric calculator.
pub struct Calculator {
    /// Metric name; also the CSV column header.
    pub name: &'static str,
    /// Extraction function over one healthy cycle's buffered events.
    pub compute: fn(&Cycle, &MarkerSet) -> Result<MetricValue, MetricError>,
}

/// The fixed calculator pipeline, in evaluation and column order.
pub const PIPELINE: &[Calculator] = &[
    Calculator {
        name: "ShutdownType",
        compute: calculators::shutdown_type,
    },
    Calculator {
        name: "ReachedNormalOp",
        compute: calculators::reached_normal_op,
    },
    Calculator {
        name: "CapacitorTime",
        compute: calculators::capacitor_time,
    },
    Calculator {
        name: "BackupTime",
        compute: calculators::backup_time,
    },
    Calculator {
        name: "WaitIoDrain",
        compute: calculators::wait_io_drain,
    },
    Calculator {
        name: "ShutdownDelay",
        compute: calculators::shutdown_delay,
    },
    Calculator {
        name: "WaitMeas",
        compute: calculators::wait_meas,
    },
    Calculator {
        name: "Bridging",
        compute: calculators::bridging_time,
    },
    Calculator {
        name: "BridgeCount",
        compute: calculators::bridge_count,
    },
    Calculator {
        name: "WrShutdownReason",
        compute: calculators::write_shutdown_reason_time,
    },
];

/// Metric names in pipeline order.
pub fn metric_names() -> impl Iterator<Item = &'static str> {
    PIPELINE.iter().map(|c| c.name)
}

/// Run every calculator over one healthy cycle.
///
/// Fails on the first calculator error; the caller skips the cycle's whole
/// row, logs the error, and continues with the next cycle.
pub fn compute_all(
    cycle: &Cycle,
    markers: &MarkerSet,
) -> Result<Vec<(&'static str, MetricValue)>, MetricError> {
    PIPELINE
        .iter()
        .map(|c| (c.compute)(cycle, markers).map(|v| (c.name, v)))
        .collect()
}

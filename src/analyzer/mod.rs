//! Pipeline orchestration.
//!
//! Single-threaded, pull-based processing: each input line is fully
//! decoded, segmented, and, when it closes a cycle, validated and
//! metric-extracted before the next line is read. Nothing is buffered
//! beyond the one open cycle and the one cycle being handled, and an open
//! cycle at end of input is dropped, not flushed.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::decoder::decode_line;
use crate::dialect::MarkerSet;
use crate::health::{check_cycle, HealthVerdict};
use crate::iotrace::{replay, SignalSpec};
use crate::metrics::compute_all;
use crate::segmenter::{Boundary, Cycle, Segmenter};
use crate::sink::CsvSink;

/// Counters reported at the end of a run.
///
/// Every skip and reject path increments one of these, so a missing CSV
/// row is always explainable from the log plus this summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Input lines consumed.
    pub lines: u64,
    /// Lines skipped because the tick token did not parse.
    pub malformed: u64,
    /// Closed cycles delivered by the segmenter.
    pub cycles_closed: u64,
    /// Open cycles superseded by a later start marker.
    pub cycles_superseded: u64,
    /// Cycles rejected by the health checker.
    pub rejected: u64,
    /// Healthy cycles whose metric row was skipped on an incomplete interval.
    pub rows_skipped: u64,
    /// CSV rows written.
    pub rows_written: u64,
    /// Trace lines emitted (trace mode only).
    pub trace_lines: u64,
    /// Whether a cycle was still open (and dropped) at end of input.
    pub dropped_open: bool,
}

/// Drives the decode → segment → validate → extract pipeline.
pub struct Analyzer<'a> {
    markers: &'a MarkerSet,
    max_lines: Option<u64>,
}

impl<'a> Analyzer<'a> {
    pub fn new(markers: &'a MarkerSet, max_lines: Option<u64>) -> Self {
        Self { markers, max_lines }
    }

    /// Run the metric pipeline over a line source, writing one CSV row per
    /// healthy cycle.
    pub fn run_stat<R: BufRead, W: Write>(
        &self,
        reader: R,
        sink: &mut CsvSink<W>,
    ) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut segmenter = Segmenter::new();

        for line in reader.lines() {
            let line = line.context("reading input line")?;
            if self.max_lines.is_some_and(|max| stats.lines >= max) {
                break;
            }
            stats.lines += 1;

            let Some(cycle) = self.segment(&mut segmenter, &mut stats, &line) else {
                continue;
            };
            stats.cycles_closed += 1;
            info!(
                seqno = cycle.seqno,
                lno_start = cycle.lno_start,
                lno_end = cycle.lno_last(),
                "cycle closed",
            );

            match check_cycle(&cycle, self.markers) {
                HealthVerdict::Rejected(reason) => {
                    warn!(seqno = cycle.seqno, %reason, "cycle rejected");
                    stats.rejected += 1;
                    continue;
                }
                HealthVerdict::Ok => {}
            }

            match compute_all(&cycle, self.markers) {
                Ok(values) => {
                    sink.write_row(&cycle, &values)?;
                    stats.rows_written += 1;
                }
                Err(err) => {
                    warn!(seqno = cycle.seqno, error = %err, "metric row skipped");
                    stats.rows_skipped += 1;
                }
            }
        }

        self.finish(segmenter, &mut stats);
        Ok(stats)
    }

    /// Replay healthy cycles as an IO trace, writing human-readable lines.
    ///
    /// When `only_seqno` is given, only that cycle is replayed; otherwise
    /// every closed, healthy cycle is.
    pub fn run_trace<R: BufRead, W: Write>(
        &self,
        reader: R,
        signals: &[SignalSpec],
        only_seqno: Option<u64>,
        out: &mut W,
    ) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut segmenter = Segmenter::new();

        for line in reader.lines() {
            let line = line.context("reading input line")?;
            if self.max_lines.is_some_and(|max| stats.lines >= max) {
                break;
            }
            stats.lines += 1;

            let Some(cycle) = self.segment(&mut segmenter, &mut stats, &line) else {
                continue;
            };
            stats.cycles_closed += 1;

            if only_seqno.is_some_and(|want| want != cycle.seqno) {
                continue;
            }

            if let HealthVerdict::Rejected(reason) = check_cycle(&cycle, self.markers) {
                warn!(seqno = cycle.seqno, %reason, "cycle rejected, not traced");
                stats.rejected += 1;
                continue;
            }

            writeln!(out, "{}", cycle.title()).context("writing trace output")?;
            for trace_line in replay(&cycle, signals, self.markers) {
                writeln!(out, "{trace_line}").context("writing trace output")?;
                stats.trace_lines += 1;
            }
        }

        self.finish(segmenter, &mut stats);
        Ok(stats)
    }

    /// Decode and segment one line, returning the cycle it closed, if any.
    fn segment(
        &self,
        segmenter: &mut Segmenter,
        stats: &mut RunStats,
        line: &str,
    ) -> Option<Cycle> {
        let event = match decode_line(stats.lines, line) {
            Ok(ev) => ev,
            Err(err) => {
                debug!(error = %err, "skipping malformed line");
                stats.malformed += 1;
                return None;
            }
        };

        let boundary = Boundary::classify(self.markers, &event.message);
        segmenter.push(event, boundary)
    }

    fn finish(&self, segmenter: Segmenter, stats: &mut RunStats) {
        stats.cycles_superseded = segmenter.superseded();
        stats.dropped_open = segmenter.has_open();
        if stats.dropped_open {
            debug!("cycle still open at end of input, dropped");
        }
        info!(
            lines = stats.lines,
            malformed = stats.malformed,
            cycles = stats.cycles_closed,
            rejected = stats.rejected,
            rows = stats.rows_written,
            skipped = stats.rows_skipped,
            "run finished",
        );
    }
}

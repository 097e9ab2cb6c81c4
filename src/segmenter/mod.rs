//! Cycle segmentation.
//!
//! Groups the decoded event stream into discrete power cycles bounded by
//! firmware start/end markers. At most one cycle is open at any time; a
//! cycle-start marker unconditionally supersedes whatever is open,
//! favoring recency over completeness when the device restarts without a
//! clean end marker.

use tracing::warn;

use crate::decoder::LogEvent;
use crate::dialect::{contains_any, MarkerSet};

/// Boundary classification of one event's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Message matches the cycle-start pattern, carrying the cold-start flag.
    Start { cold_start: bool },
    /// Message matches a terminal cycle-end marker.
    End,
    /// Anything else.
    Unknown,
}

impl Boundary {
    /// Classify a message into exactly one boundary kind.
    pub fn classify(markers: &MarkerSet, message: &str) -> Self {
        if let Some(caps) = markers.cycle_start.captures(message) {
            return Self::Start {
                cold_start: caps.get(1).map(|m| m.as_str()) == Some("1"),
            };
        }
        if contains_any(message, markers.cycle_end) {
            return Self::End;
        }
        Self::Unknown
    }
}

/// One power-loss-to-restart episode and its buffered events.
#[derive(Debug, Clone)]
pub struct Cycle {
    /// Monotonic cycle sequence number within the run.
    pub seqno: u64,
    /// Line number of the cycle-start event.
    pub lno_start: u64,
    /// Line number of the cycle-end event; unset while the cycle is open.
    pub lno_end: Option<u64>,
    /// Whether this cycle began from a full power-on reset.
    pub cold_start: bool,
    /// Buffered events in arrival order, start and end markers included.
    pub events: Vec<LogEvent>,
}

impl Cycle {
    /// Whether the cycle has seen its end marker.
    pub fn is_closed(&self) -> bool {
        self.lno_end.is_some()
    }

    /// Last line number of the cycle, falling back to the start line while open.
    pub fn lno_last(&self) -> u64 {
        self.lno_end.unwrap_or(self.lno_start)
    }

    /// Short human-readable identification used in diagnostics.
    pub fn title(&self) -> String {
        format!(
            "cycle {}: lines {} to {}",
            self.seqno,
            self.lno_start,
            self.lno_last()
        )
    }
}

/// Stateful one-pass segmenter over the decoded event stream.
#[derive(Debug, Default)]
pub struct Segmenter {
    next_seqno: u64,
    open: Option<Cycle>,
    superseded: u64,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event; returns a cycle when this event closed it.
    ///
    /// A start marker always begins a fresh cycle, discarding any open one.
    /// The discard is diagnosed only when the open cycle was not itself a
    /// cold start; a cold-start cycle legitimately ends in silence when the
    /// supply drops too fast for the shutdown sequencer to log anything.
    pub fn push(&mut self, event: LogEvent, boundary: Boundary) -> Option<Cycle> {
        match boundary {
            Boundary::Start { cold_start } => {
                if let Some(open) = self.open.take() {
                    self.superseded += 1;
                    if !open.cold_start {
                        warn!(
                            seqno = open.seqno,
                            lno_start = open.lno_start,
                            lno = event.lno,
                            "incomplete cycle discarded",
                        );
                    }
                }
                self.open = Some(Cycle {
                    seqno: self.bump_seqno(),
                    lno_start: event.lno,
                    lno_end: None,
                    cold_start,
                    events: vec![event],
                });
                None
            }
            Boundary::End => match self.open.take() {
                Some(mut cycle) => {
                    cycle.lno_end = Some(event.lno);
                    cycle.events.push(event);
                    Some(cycle)
                }
                // End marker with no open cycle: pre-cycle noise.
                None => None,
            },
            Boundary::Unknown => {
                if let Some(cycle) = self.open.as_mut() {
                    cycle.events.push(event);
                }
                None
            }
        }
    }

    /// Number of open cycles superseded by a later start marker.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    /// Whether a cycle is currently open.
    pub fn has_open(&self) -> bool {
        self.open.is_some()
    }

    fn bump_seqno(&mut self) -> u64 {
        let n = self.next_seqno;
        self.next_seqno += 1;
        n
    }
}

//! Diagnostic IO trace replay.
//!
//! Replays one health-checked cycle's events in order, tracking the
//! last-known state of caller-named digital signals and emitting a
//! chronological trace of state changes, interleaved with annotations for
//! power-state-machine dispatches, external-device power sequencing, and
//! shutdown-start detection. This is a human-readable diagnostic stream,
//! not a metric; it has no pass/fail outcome.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::dialect::MarkerSet;
use crate::segmenter::Cycle;
use crate::tick::tick_diff;

/// Errors raised when setting up a trace invocation.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("unknown signal name: {0}")]
    UnknownSignal(String),
}

/// A named digital signal bound to a fixed port address and pin number.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SignalSpec {
    pub name: String,
    pub port: u32,
    pub pin: u32,
}

/// Last-known level of a tracked signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLevel {
    Unknown,
    Low,
    High,
}

impl SignalLevel {
    fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Self::Low
        } else {
            Self::High
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

/// One emitted trace line.
#[derive(Debug, Clone)]
pub struct TraceLine {
    /// Input line number of the originating event.
    pub lno: u64,
    /// Absolute device tick of the originating event.
    pub tick: u32,
    /// Tick delta since the previous emitted line of any kind.
    pub delta_ms: i64,
    pub kind: TraceKind,
}

/// What a trace line reports.
#[derive(Debug, Clone)]
pub enum TraceKind {
    /// A tracked signal changed state.
    SignalChange { name: String, level: SignalLevel },
    /// A non-IO event worth seeing interleaved with signal changes.
    Annotation { text: String },
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8} {:>12} {:>+8} ", self.lno, self.tick, self.delta_ms)?;
        match &self.kind {
            TraceKind::SignalChange { name, level } => {
                write!(f, "{name} -> {}", level.as_str())
            }
            TraceKind::Annotation { text } => f.write_str(text),
        }
    }
}

/// Resolve requested signal names against the configured signal table.
///
/// An empty request selects every configured signal; an unrecognized name
/// fails the invocation (and only the invocation).
pub fn resolve_signals(
    configured: &[SignalSpec],
    requested: &[String],
) -> Result<Vec<SignalSpec>, TraceError> {
    if requested.is_empty() {
        return Ok(configured.to_vec());
    }
    requested
        .iter()
        .map(|name| {
            configured
                .iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| TraceError::UnknownSignal(name.clone()))
        })
        .collect()
}

struct SignalState {
    spec: SignalSpec,
    level: SignalLevel,
}

/// Replay one cycle's events, reconstructing signal states chronologically.
pub fn replay(cycle: &Cycle, signals: &[SignalSpec], markers: &MarkerSet) -> Vec<TraceLine> {
    let mut states: Vec<SignalState> = signals
        .iter()
        .map(|spec| SignalState {
            spec: spec.clone(),
            level: SignalLevel::Unknown,
        })
        .collect();

    let mut lines = Vec::new();
    let mut last_tick: Option<u32> = None;

    let mut emit = |lno: u64, tick: u32, kind: TraceKind, last: &mut Option<u32>| {
        let delta_ms = last.map_or(0, |prev| tick_diff(prev, tick));
        *last = Some(tick);
        lines.push(TraceLine {
            lno,
            tick,
            delta_ms,
            kind,
        });
    };

    for ev in &cycle.events {
        if let Some(caps) = markers.gpio_report.captures(&ev.message) {
            let parsed = (
                caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()),
                caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()),
                caps.get(3).and_then(|m| m.as_str().parse::<u8>().ok()),
            );
            if let (Some(port), Some(pin), Some(bit)) = parsed {
                let level = SignalLevel::from_bit(bit);
                if let Some(state) = states
                    .iter_mut()
                    .find(|s| s.spec.port == port && s.spec.pin == pin)
                {
                    if state.level != level {
                        state.level = level;
                        emit(
                            ev.lno,
                            ev.tick,
                            TraceKind::SignalChange {
                                name: state.spec.name.clone(),
                                level,
                            },
                            &mut last_tick,
                        );
                    }
                }
            }
            continue;
        }

        let annotate = ev.message.contains(markers.psm_dispatch)
            || ev.message.contains(markers.ext_power_up)
            || ev.message.contains(markers.ext_power_down)
            || ev.message.contains(markers.shutdown_start);
        if annotate {
            emit(
                ev.lno,
                ev.tick,
                TraceKind::Annotation {
                    text: ev.message.clone(),
                },
                &mut last_tick,
            );
        }
    }

    lines
}

//! Cycle health validation.
//!
//! A closed cycle must prove its log data is self-consistent before any
//! metric is trusted. Checks run in a fixed order and short-circuit on the
//! first failure; a rejected cycle is excluded from output but never stops
//! the run.

use crate::dialect::MarkerSet;
use crate::metrics::calculators::classify_shutdown;
use crate::metrics::ShutdownType;
use crate::segmenter::Cycle;

/// Outcome of validating one closed cycle. Derived, not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthVerdict {
    /// The cycle's data is self-consistent; metrics may be extracted.
    Ok,
    /// The cycle is excluded from output, with a human-readable reason.
    Rejected(String),
}

/// Validate one closed cycle, short-circuiting on the first failed check.
pub fn check_cycle(cycle: &Cycle, markers: &MarkerSet) -> HealthVerdict {
    if let Some(v) = check_line_damage(cycle, markers) {
        return v;
    }
    if let Some(v) = check_fatal_markers(cycle, markers) {
        return v;
    }
    if let Some(v) = check_power_balance(cycle, markers) {
        return v;
    }
    if let Some(v) = check_shutdown_reason(cycle, markers) {
        return v;
    }
    HealthVerdict::Ok
}

/// Any event carrying the capture tool's line-damage marker taints the cycle.
fn check_line_damage(cycle: &Cycle, markers: &MarkerSet) -> Option<HealthVerdict> {
    cycle
        .events
        .iter()
        .find(|ev| ev.message.contains(markers.line_damage))
        .map(|ev| HealthVerdict::Rejected(format!("damaged log line at {}", ev.lno)))
}

/// Firmware-reported fatal conditions reject the cycle outright.
fn check_fatal_markers(cycle: &Cycle, markers: &MarkerSet) -> Option<HealthVerdict> {
    for ev in &cycle.events {
        for bad in markers.fatal {
            if ev.message.contains(bad) {
                return Some(HealthVerdict::Rejected((*bad).to_string()));
            }
        }
    }
    None
}

/// External devices must be powered up and down strictly in pairs.
///
/// A running counter over the sequencing markers must stay within {0,1};
/// anything else means the power sequencer double-fired or lost a step.
fn check_power_balance(cycle: &Cycle, markers: &MarkerSet) -> Option<HealthVerdict> {
    let mut powered: i32 = 0;

    for ev in &cycle.events {
        if ev.message.contains(markers.ext_power_up) {
            powered += 1;
        } else if ev.message.contains(markers.ext_power_down) {
            powered -= 1;
        } else {
            continue;
        }
        if !(0..=1).contains(&powered) {
            return Some(HealthVerdict::Rejected(format!(
                "external device power out of balance at line {} (count {powered})",
                ev.lno
            )));
        }
    }
    None
}

/// Backup shutdowns must record shutdown reason 3 in non-volatile storage.
///
/// Only demanded from cycles that performed a backup. Two log dialects are
/// tried: a reverse scan for the last reason update, then a forward scan
/// pairing the reason write with its success confirmation.
fn check_shutdown_reason(cycle: &Cycle, markers: &MarkerSet) -> Option<HealthVerdict> {
    if classify_shutdown(cycle, markers) == ShutdownType::NoBackup {
        return None;
    }

    match confirmed_shutdown_reason(cycle, markers) {
        Some(3) => None,
        Some(n) => Some(HealthVerdict::Rejected(format!(
            "shutdown reason updated to {n}, expected 3"
        ))),
        None => Some(HealthVerdict::Rejected(
            "no confirmed shutdown reason write".to_string(),
        )),
    }
}

/// The confirmed shutdown reason, from whichever dialect recorded one.
fn confirmed_shutdown_reason(cycle: &Cycle, markers: &MarkerSet) -> Option<u32> {
    // Dialect a: the last reason update is authoritative on its own.
    for ev in cycle.events.iter().rev() {
        if let Some(caps) = markers.reason_update.captures(&ev.message) {
            return caps.get(1).and_then(|m| m.as_str().parse().ok());
        }
    }

    // Dialect b: the write is only confirmed by a later success marker.
    let mut pending: Option<u32> = None;
    for ev in &cycle.events {
        if pending.is_none() {
            if let Some(caps) = markers.reason_write.captures(&ev.message) {
                pending = caps.get(1).and_then(|m| m.as_str().parse().ok());
            }
        } else if ev.message.contains(markers.reason_write_ok) {
            return pending;
        }
    }
    None
}

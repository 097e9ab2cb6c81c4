//! The individual metric calculators.
//!
//! Each calculator owns one search strategy over a cycle's event buffer:
//! classification or boolean by presence, backward boundary search, paired
//! forward scan, first-match numeric extraction, or latch counting. The
//! optional-vs-mandatory distinction is per calculator: a paired interval
//! whose markers are both absent means the feature did not run this cycle
//! (zero), while exactly one boundary means the log is incomplete (error).

use tracing::warn;

use super::{MetricError, MetricValue, ShutdownType};
use crate::dialect::{contains_any, MarkerSet};
use crate::segmenter::Cycle;
use crate::tick::tick_diff_secs;

/// Classify a cycle's shutdown by presence of the backup marker.
///
/// Shared with the health checker, which only demands shutdown-reason
/// bookkeeping from cycles that performed a backup.
pub fn classify_shutdown(cycle: &Cycle, markers: &MarkerSet) -> ShutdownType {
    if cycle
        .events
        .iter()
        .any(|ev| ev.message.contains(markers.backup_performed))
    {
        ShutdownType::WithBackup
    } else {
        ShutdownType::NoBackup
    }
}

/// `ShutdownType`: classification by presence; never fails.
pub fn shutdown_type(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    Ok(MetricValue::Label(classify_shutdown(cycle, markers).as_str()))
}

/// `ReachedNormalOp`: whether the device reached normal operation; never fails.
pub fn reached_normal_op(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    let reached = cycle
        .events
        .iter()
        .any(|ev| ev.message.contains(markers.normal_operation));
    Ok(MetricValue::Flag(reached))
}

/// `CapacitorTime`: how long the device bridged on backup capacitor power.
///
/// Backward search from the end of the buffer: the terminal marker, then
/// the supervisor dispatch that preceded it, then the supply-state switch
/// that started the episode. A missing boundary fails the cycle's row; a
/// capacitor interval is mandatory for every cycle that reached its end
/// marker.
pub fn capacitor_time(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    let events = &cycle.events;

    let mut i = events.len();
    let mut end = None;
    while i > 0 {
        i -= 1;
        if contains_any(&events[i].message, markers.capacitor_end) {
            end = Some(events[i].tick);
            break;
        }
    }
    let Some(end) = end else {
        return Err(MetricError::incomplete(
            "CapacitorTime",
            cycle,
            "no terminal marker",
        ));
    };

    while i > 0 {
        i -= 1;
        if contains_any(&events[i].message, markers.capacitor_transition) {
            break;
        }
    }

    let mut start = None;
    while i > 0 {
        i -= 1;
        if events[i].message.contains(markers.capacitor_start) {
            start = Some(events[i].tick);
            break;
        }
    }
    let Some(start) = start else {
        return Err(MetricError::incomplete(
            "CapacitorTime",
            cycle,
            "no supply-state switch before the dispatch marker",
        ));
    };

    Ok(MetricValue::Seconds(tick_diff_secs(start, end)))
}

/// `BackupTime`: duration of the RAM backup, if one ran.
///
/// Paired forward scan: first slave-stop dispatch to the
/// wait-for-task-completion dispatch. Neither marker means no backup ran
/// (zero); exactly one means the backup was cut short mid-log (error).
pub fn backup_time(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    let mut start = None;
    let mut end = None;

    for ev in &cycle.events {
        if start.is_none() && ev.message.contains(markers.backup_start) {
            start = Some(ev.tick);
        }
        if ev.message.contains(markers.backup_end) {
            end = Some(ev.tick);
            break;
        }
    }

    match (start, end) {
        (None, None) => Ok(MetricValue::Seconds(0.0)),
        (Some(s), Some(e)) => Ok(MetricValue::Seconds(tick_diff_secs(s, e))),
        _ => Err(MetricError::incomplete(
            "BackupTime",
            cycle,
            "backup interval has only one boundary",
        )),
    }
}

/// `WaitIoDrain`: explicitly logged IO drain duration; absent means zero.
pub fn wait_io_drain(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    Ok(MetricValue::Seconds(
        first_ms_capture(cycle, &markers.io_drain_ms).unwrap_or(0.0),
    ))
}

/// `ShutdownDelay`: explicitly logged delay before handling power down.
///
/// The shutdown sequencer always logs this once; a cycle without it is
/// missing data and its row is skipped.
pub fn shutdown_delay(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    match first_ms_capture(cycle, &markers.shutdown_delay_ms) {
        Some(secs) => Ok(MetricValue::Seconds(secs)),
        None => Err(MetricError::incomplete(
            "ShutdownDelay",
            cycle,
            "no power-down delay message",
        )),
    }
}

/// `WaitMeas`: time spent stopping the measurement subsystem.
///
/// Two firmware revisions word this differently; the revision is detected
/// first, then its interval pair is scanned. No revision marker means the
/// measurement subsystem never ran (zero).
pub fn wait_meas(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    enum Revision {
        V1,
        V2,
    }

    let mut revision = None;
    for ev in &cycle.events {
        if ev.message.contains(markers.meas_stop_v1) {
            revision = Some(Revision::V1);
            break;
        }
        if ev.message.contains(markers.meas_stop_v2) {
            revision = Some(Revision::V2);
            break;
        }
    }
    let Some(revision) = revision else {
        return Ok(MetricValue::Seconds(0.0));
    };

    let mut start = None;
    let mut end = None;
    for ev in &cycle.events {
        match revision {
            Revision::V1 => {
                if ev.message.contains(markers.meas_v1_start) {
                    start = Some(ev.tick);
                }
                if contains_any(&ev.message, markers.meas_v1_end) {
                    end = Some(ev.tick);
                }
            }
            Revision::V2 => {
                if markers.meas_v2_start.is_match(&ev.message) {
                    start = Some(ev.tick);
                }
                if ev.message.contains(markers.meas_v2_end) {
                    end = Some(ev.tick);
                }
            }
        }
    }

    match (start, end) {
        (None, None) => Ok(MetricValue::Seconds(0.0)),
        (Some(s), Some(e)) => Ok(MetricValue::Seconds(tick_diff_secs(s, e))),
        _ => Err(MetricError::incomplete(
            "WaitMeas",
            cycle,
            "measurement stop interval has only one boundary",
        )),
    }
}

/// `Bridging`: powersave-level to shutdown-level supervisor dispatch.
///
/// Last occurrences win; both absent means the supply never sagged that
/// far (zero). Never fails.
pub fn bridging_time(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    let mut start = None;
    let mut end = None;

    for ev in &cycle.events {
        if ev.message.contains(markers.power_below_powersave) {
            start = Some(ev.tick);
        }
        if ev.message.contains(markers.power_below_shutdown) {
            end = Some(ev.tick);
        }
    }

    match (start, end) {
        (Some(s), Some(e)) => Ok(MetricValue::Seconds(tick_diff_secs(s, e))),
        _ => Ok(MetricValue::Seconds(0.0)),
    }
}

/// `BridgeCount`: how many brown-outs the device bridged and recovered from.
///
/// Latch counting: armed when the supply drops below the powersave level,
/// consumed when it comes back above the startup level. Never fails.
pub fn bridge_count(cycle: &Cycle, markers: &MarkerSet) -> Result<MetricValue, MetricError> {
    let mut armed = false;
    let mut count = 0u64;

    for ev in &cycle.events {
        if ev.message.contains(markers.power_below_powersave) {
            armed = true;
        } else if armed && ev.message.contains(markers.power_above_startup) {
            count += 1;
            armed = false;
        }
    }

    Ok(MetricValue::Count(count))
}

/// Lines tolerated between the reason-3 write start and its confirmation
/// before the write is considered lost.
const REASON_WRITE_SEPARATION_LIMIT: u32 = 5;

/// `WrShutdownReason`: latency of the reason-3 non-volatile write.
///
/// Anchored at the first reason-3 write marker (either log dialect) and
/// closed by the success confirmation. A cycle that never confirms the
/// write reports zero; the health checker separately decides whether that
/// cycle was trustworthy at all.
pub fn write_shutdown_reason_time(
    cycle: &Cycle,
    markers: &MarkerSet,
) -> Result<MetricValue, MetricError> {
    let mut start = None;
    let mut separation = 0u32;

    for ev in &cycle.events {
        if start.is_none() {
            let is_reason3_write = markers.reason_update_final.is_match(&ev.message)
                || markers
                    .reason_write
                    .captures(&ev.message)
                    .and_then(|c| c.get(1))
                    .is_some_and(|m| m.as_str() == "3");
            if is_reason3_write {
                start = Some(ev.tick);
            }
            continue;
        }

        if let Some(s) = start {
            if ev.message.contains(markers.reason_write_ok) {
                return Ok(MetricValue::Seconds(tick_diff_secs(s, ev.tick)));
            }
            separation += 1;
            if separation == REASON_WRITE_SEPARATION_LIMIT {
                warn!(
                    seqno = cycle.seqno,
                    lno_start = cycle.lno_start,
                    lno_end = cycle.lno_last(),
                    "shutdown reason write not confirmed within {} lines",
                    REASON_WRITE_SEPARATION_LIMIT,
                );
            }
        }
    }

    Ok(MetricValue::Seconds(0.0))
}

/// First match of a millisecond-valued marker, converted to seconds.
fn first_ms_capture(cycle: &Cycle, pattern: &regex::Regex) -> Option<f64> {
    for ev in &cycle.events {
        if let Some(caps) = pattern.captures(&ev.message) {
            if let Some(ms) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) {
                return Some(ms as f64 / 1000.0);
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decoder::LogEvent;

    fn cycle_of(messages: &[(u32, &str)]) -> Cycle {
        let events = messages
            .iter()
            .enumerate()
            .map(|(i, (tick, msg))| LogEvent {
                lno: i as u64 + 1,
                wall_time: None,
                tick: *tick,
                module: "PS".to_string(),
                task: "psm".to_string(),
                message: msg.to_string(),
            })
            .collect();
        Cycle {
            seqno: 0,
            lno_start: 1,
            lno_end: Some(messages.len() as u64),
            cold_start: false,
            events,
        }
    }

    #[test]
    fn test_shutdown_type_classification() {
        let m = MarkerSet::default_dialect();
        let with = cycle_of(&[(0, "psm: save ram-back started")]);
        let without = cycle_of(&[(0, "psm: plain power down")]);
        assert_eq!(classify_shutdown(&with, &m), ShutdownType::WithBackup);
        assert_eq!(classify_shutdown(&without, &m), ShutdownType::NoBackup);
        assert_eq!(
            shutdown_type(&with, &m).unwrap(),
            MetricValue::Label("With Backup")
        );
    }

    #[test]
    fn test_reached_normal_op() {
        let m = MarkerSet::default_dialect();
        let yes = cycle_of(&[(0, "psm: enter normal-operation")]);
        let no = cycle_of(&[(0, "psm: enter infr-ready")]);
        assert_eq!(reached_normal_op(&yes, &m).unwrap(), MetricValue::Flag(true));
        assert_eq!(reached_normal_op(&no, &m).unwrap(), MetricValue::Flag(false));
    }

    #[test]
    fn test_capacitor_time_complete_triplet() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (500, "psm: power supply state switch: Normal -> FilteringTime"),
            (700, "psm: PSCm send event PowerBelowPowersaveLevel"),
            (1000, "psm: shutdown took 300 ms"),
        ]);
        assert_eq!(
            capacitor_time(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.5)
        );
    }

    #[test]
    fn test_capacitor_time_across_tick_wrap() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (4_294_967_290, "psm: power supply state switch: Normal -> FilteringTime"),
            (4_294_967_295, "psm: PSCm send event PowerBelowShutdownLevel"),
            (5, "psm: enter psm wait-for-reset"),
        ]);
        // 11 ms across the 2^32 wrap.
        assert_eq!(
            capacitor_time(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.011)
        );
    }

    #[test]
    fn test_capacitor_time_missing_end_marker_fails() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (500, "psm: power supply state switch: Normal -> FilteringTime"),
            (700, "psm: PSCm send event PowerBelowPowersaveLevel"),
        ]);
        assert!(matches!(
            capacitor_time(&cycle, &m).unwrap_err(),
            MetricError::IncompleteInterval { metric: "CapacitorTime", .. }
        ));
    }

    #[test]
    fn test_capacitor_time_missing_start_marker_fails() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (700, "psm: PSCm send event PowerBelowPowersaveLevel"),
            (1000, "psm: shutdown took 300 ms"),
        ]);
        assert!(capacitor_time(&cycle, &m).is_err());
    }

    #[test]
    fn test_capacitor_start_after_dispatch_is_not_matched() {
        let m = MarkerSet::default_dialect();
        // The state switch arrives after the dispatch marker, so the
        // backward search must not pair them.
        let cycle = cycle_of(&[
            (700, "psm: PSCm send event PowerBelowPowersaveLevel"),
            (800, "psm: power supply state switch: Normal -> FilteringTime"),
            (1000, "psm: shutdown took 300 ms"),
        ]);
        assert!(capacitor_time(&cycle, &m).is_err());
    }

    #[test]
    fn test_backup_time_pair() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (100, "psm: PSCm send slaves with event stop"),
            (250, "psm: PSCm send slaves with event WaitForTaskCompletion"),
        ]);
        assert_eq!(backup_time(&cycle, &m).unwrap(), MetricValue::Seconds(0.15));
    }

    #[test]
    fn test_backup_time_absent_is_zero() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[(100, "psm: nothing of note")]);
        assert_eq!(backup_time(&cycle, &m).unwrap(), MetricValue::Seconds(0.0));
    }

    #[test]
    fn test_backup_time_half_pair_fails() {
        let m = MarkerSet::default_dialect();
        let only_start = cycle_of(&[(100, "psm: PSCm send slaves with event stop")]);
        let only_end = cycle_of(&[(100, "psm: PSCm send slaves with event WaitForTaskCompletion")]);
        assert!(backup_time(&only_start, &m).is_err());
        assert!(backup_time(&only_end, &m).is_err());
    }

    #[test]
    fn test_wait_io_drain_numeric_extraction() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[(100, "ubi: waiting ubi drain took 120 ms")]);
        assert_eq!(wait_io_drain(&cycle, &m).unwrap(), MetricValue::Seconds(0.12));

        let absent = cycle_of(&[(100, "ubi: idle")]);
        assert_eq!(wait_io_drain(&absent, &m).unwrap(), MetricValue::Seconds(0.0));
    }

    #[test]
    fn test_shutdown_delay_is_mandatory() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[(100, "psm: delayed 15 ms before handling power down")]);
        assert_eq!(
            shutdown_delay(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.015)
        );

        let absent = cycle_of(&[(100, "psm: idle")]);
        assert!(shutdown_delay(&absent, &m).is_err());
    }

    #[test]
    fn test_wait_meas_undetected_revision_is_zero() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[(100, "psm: nothing about measurements")]);
        assert_eq!(wait_meas(&cycle, &m).unwrap(), MetricValue::Seconds(0.0));
    }

    #[test]
    fn test_wait_meas_v1_interval() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (50, "app: MultiModuleSystemApplicationApp::stopMeasurementSystemAndWaitData"),
            (100, "psm: start shutdown"),
            (400, "psm: PSCm send slaves with event stop"),
        ]);
        assert_eq!(wait_meas(&cycle, &m).unwrap(), MetricValue::Seconds(0.3));
    }

    #[test]
    fn test_wait_meas_v2_interval() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (100, "meas: stopping meas processing"),
            (160, "meas: stopping meas processing: done"),
        ]);
        assert_eq!(wait_meas(&cycle, &m).unwrap(), MetricValue::Seconds(0.06));
    }

    #[test]
    fn test_wait_meas_v2_half_interval_fails() {
        let m = MarkerSet::default_dialect();
        // The v2 detect marker is present but the done line never arrives;
        // the end-anchored start pattern matches, the end marker does not.
        let cycle = cycle_of(&[(100, "meas: stopping meas processing")]);
        assert!(wait_meas(&cycle, &m).is_err());
    }

    #[test]
    fn test_bridging_time_and_absence() {
        let m = MarkerSet::default_dialect();
        let both = cycle_of(&[
            (100, "psm: handle PowerBelowPowersaveLevel"),
            (900, "psm: handle PowerBelowShutdownLevel"),
        ]);
        assert_eq!(bridging_time(&both, &m).unwrap(), MetricValue::Seconds(0.8));

        let only_start = cycle_of(&[(100, "psm: handle PowerBelowPowersaveLevel")]);
        assert_eq!(
            bridging_time(&only_start, &m).unwrap(),
            MetricValue::Seconds(0.0)
        );
    }

    #[test]
    fn test_bridge_count_latch() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (100, "psm: handle PowerBelowPowersaveLevel"),
            (200, "psm: handlePowerAboveStartupLevel"),
            (300, "psm: handle PowerBelowPowersaveLevel"),
            (400, "psm: handlePowerAboveStartupLevel"),
            // Above-startup without a preceding below-powersave: no count.
            (500, "psm: handlePowerAboveStartupLevel"),
        ]);
        assert_eq!(bridge_count(&cycle, &m).unwrap(), MetricValue::Count(2));
    }

    #[test]
    fn test_bridge_count_unarmed_is_zero() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[(100, "psm: handlePowerAboveStartupLevel")]);
        assert_eq!(bridge_count(&cycle, &m).unwrap(), MetricValue::Count(0));
    }

    #[test]
    fn test_write_shutdown_reason_dialect_a() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (100, "nv: update shutdown reason to 3"),
            (140, "nv: write shutdown reason succeeded"),
        ]);
        assert_eq!(
            write_shutdown_reason_time(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.04)
        );
    }

    #[test]
    fn test_write_shutdown_reason_dialect_b() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (100, "nv: writing shutdown reason 3 for shutdown"),
            (130, "nv: write shutdown reason succeeded"),
        ]);
        assert_eq!(
            write_shutdown_reason_time(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.03)
        );
    }

    #[test]
    fn test_write_shutdown_reason_unconfirmed_is_zero() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[(100, "nv: update shutdown reason to 3")]);
        assert_eq!(
            write_shutdown_reason_time(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.0)
        );
    }

    #[test]
    fn test_write_shutdown_reason_ignores_other_reasons() {
        let m = MarkerSet::default_dialect();
        let cycle = cycle_of(&[
            (100, "nv: writing shutdown reason 1 for shutdown"),
            (130, "nv: write shutdown reason succeeded"),
        ]);
        assert_eq!(
            write_shutdown_reason_time(&cycle, &m).unwrap(),
            MetricValue::Seconds(0.0)
        );
    }
}

//! Firmware log dialect marker tables.
//!
//! All literal firmware wording the pipeline matches against lives here, so
//! supporting a new log dialect is a data change rather than a code change.
//! Plain substring markers are kept as `&str`; patterns that carry an
//! embedded value (cold-start flag, durations, shutdown reason, GPIO
//! triples) are compiled [`Regex`] values.

use regex::Regex;

/// Compiled marker patterns for one firmware log dialect.
#[derive(Debug)]
pub struct MarkerSet {
    /// Dialect name as selected in the configuration.
    pub name: &'static str,

    /// Cycle boundary start, capturing the cold-start flag.
    pub cycle_start: Regex,
    /// Terminal markers closing a cycle.
    pub cycle_end: &'static [&'static str],

    /// Marker injected by the capture tool into damaged lines.
    pub line_damage: &'static str,
    /// Firmware-reported fatal conditions; any occurrence rejects a cycle.
    pub fatal: &'static [&'static str],
    /// External device power sequencing markers.
    pub ext_power_up: &'static str,
    pub ext_power_down: &'static str,

    /// Marker proving a RAM backup was performed this cycle.
    pub backup_performed: &'static str,

    /// Capacitor (backup power) interval, searched backward from cycle end.
    pub capacitor_end: &'static [&'static str],
    pub capacitor_transition: &'static [&'static str],
    pub capacitor_start: &'static str,

    /// RAM backup interval markers.
    pub backup_start: &'static str,
    pub backup_end: &'static str,

    /// Explicitly logged IO drain duration in milliseconds.
    pub io_drain_ms: Regex,
    /// Explicitly logged power-down handling delay in milliseconds.
    pub shutdown_delay_ms: Regex,

    /// Measurement-stop interval, two firmware revisions.
    pub meas_stop_v1: &'static str,
    pub meas_v1_start: &'static str,
    pub meas_v1_end: &'static [&'static str],
    pub meas_stop_v2: &'static str,
    pub meas_v2_start: Regex,
    pub meas_v2_end: &'static str,

    /// Power supervisor dispatch markers for bridging intervals.
    pub power_below_powersave: &'static str,
    pub power_below_shutdown: &'static str,
    pub power_above_startup: &'static str,

    /// Marker proving the device reached normal operation.
    pub normal_operation: &'static str,

    /// Shutdown-reason bookkeeping, two log dialects.
    pub reason_update: Regex,
    pub reason_update_final: Regex,
    pub reason_write: Regex,
    pub reason_write_ok: &'static str,

    /// GPIO state report carrying a port/pin/state triple.
    pub gpio_report: Regex,
    /// Power-state-machine dispatch prefix, annotated in IO traces.
    pub psm_dispatch: &'static str,
    /// Shutdown sequencer start marker.
    pub shutdown_start: &'static str,
}

impl MarkerSet {
    /// Look up a built-in dialect by its configured name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "pscm" => Some(Self::pscm()),
            _ => None,
        }
    }

    /// The default dialect used when the configuration names none.
    pub fn default_dialect() -> Self {
        Self::pscm()
    }

    /// Marker table for the PSCm power-supervisor firmware family.
    fn pscm() -> Self {
        Self {
            name: "pscm",
            cycle_start: re(r"system started.*coldStart ([01])"),
            cycle_end: &["shutdown took", "enter psm wait-for-reset", "dprintf buf used"],
            line_damage: "bad format",
            fatal: &["watchdog reset detected", "invalid powerdown detected"],
            ext_power_up: "power up external devices",
            ext_power_down: "power down external devices",
            backup_performed: "save ram-back",
            capacitor_end: &["shutdown took", "enter psm wait-for-reset"],
            capacitor_transition: &[
                "PSCm send event PowerBelowPowersaveLevel",
                "PSCm send event PowerBelowShutdownLevel",
            ],
            capacitor_start: "power supply state switch: Normal -> FilteringTime",
            backup_start: "PSCm send slaves with event stop",
            backup_end: "PSCm send slaves with event WaitForTaskCompletion",
            io_drain_ms: re(r"waiting ubi drain took ([0-9]+) ms"),
            shutdown_delay_ms: re(r"delayed ([0-9]+) ms before handling power down"),
            meas_stop_v1: "MultiModuleSystemApplicationApp::stopMeasurementSystemAndWaitData",
            meas_v1_start: "start shutdown",
            meas_v1_end: &["PSCm send slaves with event stop", "non-backup done"],
            meas_stop_v2: "stopping meas processing",
            meas_v2_start: re(r"stopping meas processing$"),
            meas_v2_end: "stopping meas processing: done",
            power_below_powersave: "handle PowerBelowPowersaveLevel",
            power_below_shutdown: "handle PowerBelowShutdownLevel",
            power_above_startup: "handlePowerAboveStartupLevel",
            normal_operation: "enter normal-operation",
            reason_update: re(r"update shutdown reason to ([0-9]+)"),
            reason_update_final: re(r"update shutdown reason to 3$"),
            reason_write: re(r"writing shutdown reason ([0-9]+) for shutdown"),
            reason_write_ok: "write shutdown reason succeeded",
            gpio_report: re(r"gpio port ([0-9]+) pin ([0-9]+) state ([01])"),
            psm_dispatch: "PSCm send",
            shutdown_start: "start shutdown",
        }
    }
}

/// Whether the message contains any of the given substring markers.
pub fn contains_any(message: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| message.contains(m))
}

fn re(pattern: &str) -> Regex {
    // All patterns are compile-time literals; exercised by tests below.
    Regex::new(pattern).expect("builtin marker pattern must compile")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dialects_compile() {
        assert!(MarkerSet::by_name("pscm").is_some());
        assert!(MarkerSet::by_name("nonexistent").is_none());
        assert_eq!(MarkerSet::default_dialect().name, "pscm");
    }

    #[test]
    fn test_cycle_start_captures_cold_flag() {
        let m = MarkerSet::default_dialect();
        let caps = m
            .cycle_start
            .captures("psm: system started, app v2.1 coldStart 1")
            .unwrap();
        assert_eq!(&caps[1], "1");
        assert!(m.cycle_start.captures("psm: system halted").is_none());
    }

    #[test]
    fn test_numeric_markers_capture_values() {
        let m = MarkerSet::default_dialect();
        assert_eq!(
            &m.io_drain_ms.captures("ubi: waiting ubi drain took 120 ms").unwrap()[1],
            "120"
        );
        assert_eq!(
            &m.shutdown_delay_ms
                .captures("psm: delayed 15 ms before handling power down")
                .unwrap()[1],
            "15"
        );
        assert_eq!(
            &m.reason_write
                .captures("nv: writing shutdown reason 3 for shutdown")
                .unwrap()[1],
            "3"
        );
    }

    #[test]
    fn test_reason_update_final_is_anchored() {
        let m = MarkerSet::default_dialect();
        assert!(m.reason_update_final.is_match("nv: update shutdown reason to 3"));
        assert!(!m.reason_update_final.is_match("nv: update shutdown reason to 32"));
    }

    #[test]
    fn test_gpio_report_triple() {
        let m = MarkerSet::default_dialect();
        let caps = m.gpio_report.captures("io: gpio port 2 pin 11 state 1").unwrap();
        assert_eq!(&caps[1], "2");
        assert_eq!(&caps[2], "11");
        assert_eq!(&caps[3], "1");
    }

    #[test]
    fn test_contains_any() {
        assert!(contains_any("x shutdown took 12 ms", &["shutdown took"]));
        assert!(!contains_any("x shutdown", &["shutdown took", "wait-for-reset"]));
    }
}

//! Wraparound-aware arithmetic for the firmware millisecond tick counter.
//!
//! The device keeps a free-running 32-bit millisecond counter that wraps
//! roughly every 49.7 days. Samples taken across a wrap boundary must still
//! yield the correct signed interval, so differences are computed modulo
//! 2^32 and folded into `(-2^31, 2^31]`.

/// Counter period of the 32-bit hardware tick.
const TICK_MODULUS: i64 = 1 << 32;

/// Half the counter period; modular distances above this are treated as
/// negative (i.e. `to` happened before `from`).
const TICK_HALF_PERIOD: i64 = 1 << 31;

/// Signed millisecond difference `to - from` on the wrapping tick counter.
///
/// `to` is treated as chronologically after `from` whenever the raw modular
/// distance is at most half the counter period.
pub fn tick_diff(from: u32, to: u32) -> i64 {
    let n = i64::from(to.wrapping_sub(from));
    if n > TICK_HALF_PERIOD {
        n - TICK_MODULUS
    } else {
        n
    }
}

/// Tick difference converted to seconds.
pub fn tick_diff_secs(from: u32, to: u32) -> f64 {
    tick_diff(from, to) as f64 / 1000.0
}

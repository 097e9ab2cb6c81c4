//! Log line decoding.
//!
//! Turns one raw text line into a structured [`LogEvent`]. A captured log
//! line carries an absolute wall-clock timestamp followed by the device
//! tick in fractional seconds, then the firmware module, the task name,
//! and the message payload (which keeps its `facility:` prefix):
//!
//! ```text
//! 20240312T08:15:42.113 4294704.132 PS PowerSupMonitor psm: PSCm send event PowerBelowPowersaveLevel
//! ```

use chrono::NaiveDateTime;
use thiserror::Error;

/// Wall-clock format written by the serial log capture tool.
const WALL_TIME_FORMAT: &str = "%Y%m%dT%H:%M:%S%.3f";

/// Errors that can occur while decoding a log line.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line {lno}: malformed line: {reason}")]
    MalformedLine { lno: u64, reason: &'static str },
}

/// One decoded firmware log line. Immutable once produced.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// 1-based line number in the input stream.
    pub lno: u64,
    /// Wall-clock capture time, when the timestamp token parses.
    pub wall_time: Option<NaiveDateTime>,
    /// Device millisecond tick, wrapping at 2^32.
    pub tick: u32,
    /// Firmware module identifier.
    pub module: String,
    /// Firmware task name.
    pub task: String,
    /// Message payload, including the facility prefix.
    pub message: String,
}

/// Decode a raw log line into a [`LogEvent`].
///
/// The second whitespace-delimited token is always the tick value; lines
/// whose tick token is missing or not numeric fail with
/// [`DecodeError::MalformedLine`] and are skipped by callers rather than
/// aborting the run.
pub fn decode_line(lno: u64, line: &str) -> Result<LogEvent, DecodeError> {
    let mut tokens = line.split_whitespace();

    let wall_token = tokens.next().ok_or(DecodeError::MalformedLine {
        lno,
        reason: "empty line",
    })?;

    let tick_token = tokens.next().ok_or(DecodeError::MalformedLine {
        lno,
        reason: "missing tick token",
    })?;

    let tick_secs: f64 = tick_token.parse().map_err(|_| DecodeError::MalformedLine {
        lno,
        reason: "tick token is not numeric",
    })?;

    if !tick_secs.is_finite() || tick_secs < 0.0 {
        return Err(DecodeError::MalformedLine {
            lno,
            reason: "tick value out of range",
        });
    }

    // Fractional seconds to integer milliseconds; the cast to u32 keeps the
    // 2^32 wrap semantics of the hardware counter.
    let tick = (tick_secs * 1000.0).round() as u64 as u32;

    let module = tokens.next().unwrap_or_default().to_string();
    let task = tokens.next().unwrap_or_default().to_string();
    let message = tokens.collect::<Vec<_>>().join(" ");

    Ok(LogEvent {
        lno,
        wall_time: NaiveDateTime::parse_from_str(wall_token, WALL_TIME_FORMAT).ok(),
        tick,
        module,
        task,
        message,
    })
}

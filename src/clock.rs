//! Wall-clock arithmetic for scheduled starts.
//!
//! `sync_time` is an absolute instant in the master's wall clock, expressed
//! as seconds since the Unix epoch. Slaves subtract their own wall clock
//! from it, so a simultaneous start assumes master and slave clocks agree
//! (e.g. both NTP-disciplined). No offset estimation is done here.

use std::time::Duration;

use chrono::Utc;

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Signed seconds from now until `instant`, shifted by `offset_ms`.
pub fn seconds_until(instant: f64, offset_ms: i64) -> f64 {
    instant - unix_now() + offset_ms as f64 / 1000.0
}

/// Clamp a signed number of seconds to a sleepable duration.
///
/// Negative and NaN inputs give zero; anything too large for a `Duration`
/// saturates at `Duration::MAX`.
pub fn clamp_delay(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Human-readable local timestamp with millisecond precision, for logs.
pub fn wall_clock_label() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

//! Time utilities for playtimed
//!
//! Session markers are wall-clock instants (`DateTime<Local>`) so they can
//! be logged and compared across a restart. Accumulated playtime is kept as
//! plain milliseconds.

use chrono::{DateTime, Local};

pub const MILLIS_PER_SECOND: u64 = 1_000;
pub const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;

/// Get the current local time.
///
/// This is the only place the daemon reads the wall clock; engine
/// operations receive the instant as a parameter.
#[allow(clippy::disallowed_methods)] // This is the wrapper around Local::now()
pub fn now() -> DateTime<Local> {
    chrono::Local::now()
}

/// Milliseconds elapsed from `start` to `now`.
///
/// Returns 0 when `now` is not after `start` (e.g. the wall clock was
/// stepped backwards), so folding elapsed time never decreases a total.
pub fn elapsed_millis(start: DateTime<Local>, now: DateTime<Local>) -> u64 {
    let millis = now.signed_duration_since(start).num_milliseconds();
    u64::try_from(millis).unwrap_or(0)
}

/// Whole hours contained in a millisecond count (truncating)
pub fn whole_hours(millis: u64) -> u64 {
    millis / MILLIS_PER_HOUR
}

/// Format a playtime total as `"<H>h <M>m <S>s"`.
///
/// All three components are always present; hours are not wrapped into days.
pub fn format_playtime(millis: u64) -> String {
    let hours = millis / MILLIS_PER_HOUR;
    let minutes = (millis % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let seconds = (millis % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;

    format!("{}h {}m {}s", hours, minutes, seconds)
}

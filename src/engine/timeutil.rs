//! Broadcast time arithmetic
//!
//! All spot/block time math lives here. Times arrive as `HH:MM:SS` strings;
//! an end time may also arrive as one of three next-day-midnight forms:
//! a timedelta-style `"1 day, 0:00:00"`, the literal `"24:00:00"`, or
//! `"00:00:00"` used as an end. All three normalize to 1440 minutes.

use tracing::warn;

/// Minutes in a broadcast day.
pub const DAY_MINUTES: u32 = 1440;

/// Convert an `HH:MM[:SS]` string to minutes since midnight.
///
/// Unparseable input maps to 0, matching how upstream traffic data has
/// historically been handled; the seconds field is ignored.
pub fn time_to_minutes(time: &str) -> u32 {
    let mut parts = time.trim().split(':');
    let hours = parts.next().and_then(|p| p.parse::<u32>().ok());
    let minutes = parts.next().and_then(|p| p.parse::<u32>().ok());
    match (hours, minutes) {
        (Some(h), Some(m)) => h * 60 + m,
        _ => 0,
    }
}

/// True when a raw end token means "midnight of the next day".
pub fn is_next_day_midnight(raw_end: &str) -> bool {
    let raw_end = raw_end.trim();
    (raw_end.contains("day") && raw_end.contains("0:00:00")) || raw_end == "24:00:00"
}

/// Collapse timedelta-style end tokens to a plain `HH:MM:SS` string.
///
/// `"1 day, 0:00:00"` becomes `"00:00:00"`; everything else passes through.
pub fn normalize_time_out(raw_end: &str) -> &str {
    if raw_end.contains("day") && raw_end.contains("0:00:00") {
        "00:00:00"
    } else {
        raw_end
    }
}

/// End time in minutes since midnight, with all three next-day-midnight
/// forms mapping to 1440.
pub fn end_minutes(raw_end: &str) -> u32 {
    let normalized = normalize_time_out(raw_end);
    if normalized == "00:00:00" || normalized == "24:00:00" {
        DAY_MINUTES
    } else {
        time_to_minutes(normalized)
    }
}

/// Spot duration in minutes.
///
/// When the end precedes the start without a rollover token, the spot is
/// assumed to cross midnight; genuinely inverted same-day rows surface as
/// suspiciously long durations and are logged.
pub fn duration_minutes(time_in: &str, time_out: &str) -> u32 {
    let start = time_to_minutes(time_in);
    let end = end_minutes(time_out);

    if end >= start {
        end - start
    } else {
        let duration = (DAY_MINUTES - start) + end;
        if duration > DAY_MINUTES / 2 {
            warn!(
                time_in,
                time_out, duration, "end precedes start without rollover token"
            );
        }
        duration
    }
}

/// Half-open interval overlap on minutes-since-midnight.
pub fn times_overlap(start1: u32, end1: u32, start2: u32, end2: u32) -> bool {
    start1 < end2 && end1 > start2
}

/// Overlap check that tolerates ends past midnight (> 1440).
///
/// When either range spills past 1440 the spilled portion is folded back
/// onto the clock and retested.
pub fn times_overlap_with_midnight(start1: u32, end1: u32, start2: u32, end2: u32) -> bool {
    if times_overlap(start1, end1, start2, end2) {
        return true;
    }

    if end1 > DAY_MINUTES || end2 > DAY_MINUTES {
        let end1 = if end1 > DAY_MINUTES { end1 - DAY_MINUTES } else { end1 };
        let end2 = if end2 > DAY_MINUTES { end2 - DAY_MINUTES } else { end2 };
        return times_overlap(start1, end1, start2, end2);
    }

    false
}

/// Hour component of a `HH:MM:SS` string, if parseable.
pub fn start_hour(time: &str) -> Option<u32> {
    time.trim().split(':').next()?.parse().ok()
}

/// Minute component of a `HH:MM:SS` string, if parseable.
pub fn start_minute(time: &str) -> Option<u32> {
    time.trim().split(':').nth(1)?.parse().ok()
}

/// True when a raw end token represents end-of-day for pattern matching:
/// `23:59:00`, `24:00:00`, or any next-day form.
pub fn is_end_of_day(raw_end: &str) -> bool {
    raw_end == "23:59:00" || raw_end == "24:00:00" || raw_end.contains("day")
}

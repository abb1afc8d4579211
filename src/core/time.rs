// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Timestamp helpers.
//!
//! All times are nanoseconds since the Unix epoch, stored as `u64`,
//! the same representation MCAP and ROS1 bag use for log times.

use std::time::Duration;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Intersect two inclusive ranges, returning `None` if they are disjoint.
pub fn intersect(a: (u64, u64), b: (u64, u64)) -> Option<(u64, u64)> {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (start <= end).then_some((start, end))
}

/// Clamp `time` into `[start, end]`.
pub fn clamp(time: u64, start: u64, end: u64) -> u64 {
    time.max(start).min(end)
}

/// Log-time span covered by `interval` of wall clock at `speed`.
pub fn scaled_span(interval: Duration, speed: f64) -> u64 {
    let nanos = interval.as_nanos() as f64 * speed;
    if nanos.is_finite() && nanos > 1.0 {
        nanos as u64
    } else {
        1
    }
}

/// Format a timestamp in nanoseconds to a human-readable string.
pub fn format_timestamp(nanos: u64) -> String {
    let secs = (nanos / NANOS_PER_SEC) as i64;
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    match chrono::DateTime::<chrono::Utc>::from_timestamp(secs, subsec) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => format!("{nanos} ns"),
    }
}

/// Format a duration in nanoseconds to a human-readable string.
pub fn format_duration(nanos: u64) -> String {
    let secs = nanos / NANOS_PER_SEC;
    let millis = (nanos % NANOS_PER_SEC) / 1_000_000;

    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{secs}.{millis:03}s")
    } else {
        format!("{millis}ms")
    }
}

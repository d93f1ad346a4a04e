//! Human-readable duration and finish-time estimates.
//!
//! Printer time estimates are noisy, so everything rounds up: a 12 minute
//! estimate reads "15 minutes", a 2h05 estimate reads "2.5 hours". The
//! finish time is rounded up to the same unit.

use chrono::{Duration, NaiveDateTime};

const TIME_FORMAT: &str = "%I:%M %p";
const DATE_TIME_FORMAT: &str = "%A at %I:%M %p";

/// A formatted time estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eta {
    /// Rounded duration, e.g. "2.5 hours".
    pub duration: String,
    /// Rounded wall-clock finish time, e.g. "04:30 PM".
    pub finish_time: String,
}

/// Round `time` up to the next multiple of `unit` (counted from midnight).
pub fn round_up(time: NaiveDateTime, unit: Duration) -> NaiveDateTime {
    let midnight = time.date().and_hms_opt(0, 0, 0).unwrap();
    let seconds = (time - midnight).num_seconds();
    let unit_seconds = unit.num_seconds().max(1);
    // Ceiling division; both values are non-negative.
    let rounded = (seconds + unit_seconds - 1) / unit_seconds * unit_seconds;
    midnight + Duration::seconds(rounded)
}

/// Format a remaining-time estimate in minutes as a rounded-up duration.
pub fn format_duration(minutes: u32) -> String {
    if minutes < 1 {
        "1 minute".to_string()
    } else if minutes < 55 {
        let rounded = minutes.div_ceil(5) * 5;
        format!("{rounded} minutes")
    } else if minutes < 8 * 60 {
        let half_hours = minutes.div_ceil(30);
        if half_hours == 2 {
            "1 hour".to_string()
        } else if half_hours % 2 == 0 {
            format!("{} hours", half_hours / 2)
        } else {
            format!("{}.5 hours", half_hours / 2)
        }
    } else {
        format!("{} hours", minutes.div_ceil(60))
    }
}

fn rounding_unit(minutes: u32) -> Duration {
    if minutes < 1 {
        Duration::minutes(1)
    } else if minutes < 55 {
        Duration::minutes(5)
    } else if minutes < 8 * 60 {
        Duration::minutes(30)
    } else {
        Duration::hours(1)
    }
}

/// Format a remaining-time estimate as a duration plus finish time.
///
/// The finish time is qualified with a weekday when rounding pushes it past
/// midnight.
pub fn format_eta(minutes: u32, now: NaiveDateTime) -> Eta {
    let finish = now + Duration::minutes(i64::from(minutes));
    let rounded = round_up(finish, rounding_unit(minutes));
    let finish_time = if rounded.date() == now.date() {
        rounded.format(TIME_FORMAT).to_string()
    } else {
        rounded.format(DATE_TIME_FORMAT).to_string()
    };
    Eta {
        duration: format_duration(minutes),
        finish_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(at(12, 30, 45), Duration::minutes(1)), at(12, 31, 0));
        assert_eq!(round_up(at(12, 32, 0), Duration::minutes(5)), at(12, 35, 0));
        assert_eq!(round_up(at(12, 45, 0), Duration::hours(1)), at(13, 0, 0));
        // Exact multiples stay put.
        assert_eq!(round_up(at(12, 0, 0), Duration::minutes(5)), at(12, 0, 0));
        // One second past a boundary rounds to the next unit.
        assert_eq!(round_up(at(0, 0, 1), Duration::hours(1)), at(1, 0, 0));
    }

    #[test]
    fn test_format_duration_buckets() {
        assert_eq!(format_duration(0), "1 minute");
        assert_eq!(format_duration(12), "15 minutes");
        assert_eq!(format_duration(53), "55 minutes");
        assert_eq!(format_duration(58), "1 hour");
        assert_eq!(format_duration(125), "2.5 hours");
        assert_eq!(format_duration(75), "1.5 hours");
        assert_eq!(format_duration(600), "10 hours");
    }

    #[test]
    fn test_format_eta_same_day() {
        let eta = format_eta(32, at(14, 0, 0));
        assert_eq!(eta.duration, "35 minutes");
        assert_eq!(eta.finish_time, "02:35 PM");
    }

    #[test]
    fn test_format_eta_crosses_midnight() {
        let eta = format_eta(120, at(23, 30, 0));
        assert_eq!(eta.duration, "2 hours");
        // Rounded finish lands on January 2nd, a Monday.
        assert_eq!(eta.finish_time, "Monday at 01:30 AM");
    }
}

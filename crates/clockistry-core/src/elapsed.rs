//! Duration accounting

use chrono::{DateTime, Utc};
use clockistry_api::TimeEntry;

/// Whole seconds from `start` to `end`, floored and clamped at zero.
///
/// A clock that reads earlier than `start` yields 0, never a negative value.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    // num_seconds truncates toward zero, which is a floor for non-negative deltas
    u64::try_from(end.signed_duration_since(start).num_seconds()).unwrap_or(0)
}

/// Seconds a timer has accumulated as of `now`.
///
/// Running entries derive the value from `start_time`; stopped entries report
/// the duration fixed at stop, regardless of `now`.
pub fn elapsed_seconds(entry: &TimeEntry, now: DateTime<Utc>) -> u64 {
    if entry.is_running {
        seconds_between(entry.start_time, now)
    } else {
        entry.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use clockistry_api::StartTimer;
    use clockistry_util::{EntryId, UserId};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn running_since(secs: i64) -> TimeEntry {
        TimeEntry::started(
            EntryId::new("e1"),
            UserId::new("u1"),
            StartTimer::default(),
            at(secs),
        )
    }

    #[test]
    fn floors_fractional_seconds() {
        let start = at(1000);
        assert_eq!(seconds_between(start, start + Duration::milliseconds(61_700)), 61);
        assert_eq!(seconds_between(start, start + Duration::milliseconds(999)), 0);
    }

    #[test]
    fn clamps_clock_skew_to_zero() {
        let start = at(1000);
        assert_eq!(seconds_between(start, at(990)), 0);
        assert_eq!(seconds_between(start, start - Duration::milliseconds(300)), 0);
    }

    #[test]
    fn running_entry_elapsed_is_monotonic() {
        let entry = running_since(1000);
        let mut last = 0;
        for now in [995, 1000, 1001, 1090, 1090, 5000] {
            let elapsed = elapsed_seconds(&entry, at(now));
            assert!(elapsed >= last);
            last = elapsed;
        }
        assert_eq!(elapsed_seconds(&entry, at(1090)), 90);
    }

    #[test]
    fn stopped_entry_reports_stored_duration() {
        let mut entry = running_since(1000);
        entry.is_running = false;
        entry.end_time = Some(at(1125));
        entry.duration = 125;

        assert_eq!(elapsed_seconds(&entry, at(1125)), 125);
        assert_eq!(elapsed_seconds(&entry, at(99_999)), 125);
    }
}

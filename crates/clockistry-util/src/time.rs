//! Time utilities for clockistryd
//!
//! All timer math runs against a [`Clock`] so that duration accounting can be
//! driven deterministically in tests.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `CLOCKISTRY_MOCK_TIME` environment variable can be set
//! to shift the system clock to a fixed starting point. The shifted clock keeps
//! advancing at real speed.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (UTC, e.g. `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! CLOCKISTRY_MOCK_TIME="2025-12-25 14:30:00" cargo run -p clockistryd
//! ```

use chrono::{DateTime, Utc};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "CLOCKISTRY_MOCK_TIME";

/// Offset between mock time and real time, computed once at first use.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Utc::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            match chrono::NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                Ok(naive_dt) => {
                    let offset = naive_dt.and_utc().signed_duration_since(Utc::now());
                    tracing::info!(
                        mock_time = %mock_time_str,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                Err(_) => {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current UTC time, respecting `CLOCKISTRY_MOCK_TIME` in debug builds.
#[allow(clippy::disallowed_methods)] // the one place allowed to read the system clock
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of wall-clock time for timer accounting.
///
/// Monotonicity is not required; callers clamp negative deltas.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The service clock: system time (plus mock offset in debug builds)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Clock positioned `secs` seconds after the Unix epoch
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.lock() = to;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.lock();
        *current += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid timestamp
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_on_request() {
        let clock = ManualClock::at_unix(1000);
        assert_eq!(clock.now().timestamp(), 1000);
        assert_eq!(clock.now().timestamp(), 1000);

        clock.advance(chrono::Duration::milliseconds(61_700));
        assert_eq!(clock.now().timestamp_millis(), 1_061_700);

        clock.set(DateTime::from_timestamp(5, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 5);
    }

    #[test]
    fn system_clock_tracks_now() {
        let before = now();
        let reading = SystemClock.now();
        assert!(reading >= before);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }
}

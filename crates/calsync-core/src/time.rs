//! Time windows scoping sync and prune operations.

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a time window from a start time and duration.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Self {
        Self::new(start, start + duration)
    }

    /// The configured sync window: `days` days starting at UTC midnight of
    /// the day before `now`.
    pub fn sync_window(now: DateTime<Utc>, days: u32) -> Self {
        let yesterday = (now - Duration::hours(24)).date_naive();
        let start = yesterday.and_time(chrono::NaiveTime::MIN).and_utc();
        Self::from_duration(start, Duration::days(i64::from(days)))
    }

    /// The smallest window covering every event, or `None` for an empty slice.
    ///
    /// Runs from the earliest start to the latest stop, with the end pushed
    /// one second further so the last event still overlaps the half-open
    /// interval even when it has zero duration.
    pub fn spanning(events: &[Event]) -> Option<Self> {
        let start = events.iter().map(|e| e.start).min()?;
        let last = events
            .iter()
            .flat_map(|e| [e.start, e.stop])
            .max()
            .unwrap_or(start);
        Some(Self::new(start, last + Duration::seconds(1)))
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within this window.
    ///
    /// Uses half-open interval semantics: `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if an event with the given start and stop overlaps this window.
    ///
    /// An event overlaps if it starts before the window ends and stops after
    /// the window starts. Zero-duration events overlap when their instant
    /// lies inside the window.
    pub fn overlaps(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> bool {
        if start >= stop {
            return self.contains(start);
        }
        start < self.end && stop > self.start
    }

    /// Shorthand for [`TimeWindow::overlaps`] on an event.
    pub fn overlaps_event(&self, event: &Event) -> bool {
        self.overlaps(event.start, event.stop)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn event(start: DateTime<Utc>, stop: DateTime<Utc>) -> Event {
        Event::new("e", start, stop)
    }

    #[test]
    fn creation() {
        let start = utc(2025, 2, 5, 9, 0, 0);
        let end = utc(2025, 2, 5, 17, 0, 0);
        let window = TimeWindow::new(start, end);
        assert_eq!(window.start, start);
        assert_eq!(window.end, end);
        assert_eq!(window.duration(), Duration::hours(8));
    }

    #[test]
    #[should_panic(expected = "start must be <= end")]
    fn invalid_window() {
        TimeWindow::new(utc(2025, 2, 5, 17, 0, 0), utc(2025, 2, 5, 9, 0, 0));
    }

    #[test]
    fn contains_is_half_open() {
        let window = TimeWindow::new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0));

        assert!(window.contains(utc(2025, 2, 5, 9, 0, 0)));
        assert!(window.contains(utc(2025, 2, 5, 16, 59, 59)));
        assert!(!window.contains(utc(2025, 2, 5, 17, 0, 0)));
        assert!(!window.contains(utc(2025, 2, 5, 8, 59, 59)));
    }

    #[test]
    fn overlaps() {
        let window = TimeWindow::new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0));

        // inside
        assert!(window.overlaps(utc(2025, 2, 5, 10, 0, 0), utc(2025, 2, 5, 11, 0, 0)));
        // straddles start
        assert!(window.overlaps(utc(2025, 2, 5, 8, 0, 0), utc(2025, 2, 5, 10, 0, 0)));
        // straddles end
        assert!(window.overlaps(utc(2025, 2, 5, 16, 0, 0), utc(2025, 2, 5, 18, 0, 0)));
        // contains window
        assert!(window.overlaps(utc(2025, 2, 5, 8, 0, 0), utc(2025, 2, 5, 18, 0, 0)));
        // ends at window start
        assert!(!window.overlaps(utc(2025, 2, 5, 8, 0, 0), utc(2025, 2, 5, 9, 0, 0)));
        // starts at window end
        assert!(!window.overlaps(utc(2025, 2, 5, 17, 0, 0), utc(2025, 2, 5, 18, 0, 0)));
    }

    #[test]
    fn zero_duration_overlap() {
        let window = TimeWindow::new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0));
        let at = |h| utc(2025, 2, 5, h, 0, 0);

        assert!(window.overlaps(at(9), at(9)));
        assert!(window.overlaps(at(12), at(12)));
        assert!(!window.overlaps(at(17), at(17)));
    }

    #[test]
    fn sync_window_starts_at_yesterday_midnight() {
        let now = utc(2024, 3, 15, 14, 37, 12);
        let window = TimeWindow::sync_window(now, 7);
        assert_eq!(window.start, utc(2024, 3, 14, 0, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 21, 0, 0, 0));
    }

    #[test]
    fn spanning_empty() {
        assert_eq!(TimeWindow::spanning(&[]), None);
    }

    #[test]
    fn spanning_covers_every_event() {
        let events = vec![
            event(utc(2024, 3, 15, 12, 0, 0), utc(2024, 3, 15, 13, 0, 0)),
            event(utc(2024, 3, 15, 9, 0, 0), utc(2024, 3, 15, 18, 0, 0)),
            event(utc(2024, 3, 15, 14, 0, 0), utc(2024, 3, 15, 15, 0, 0)),
        ];
        let window = TimeWindow::spanning(&events).unwrap();
        assert_eq!(window.start, utc(2024, 3, 15, 9, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 15, 18, 0, 1));
        assert!(events.iter().all(|e| window.overlaps_event(e)));
    }

    #[test]
    fn spanning_zero_duration_single_event() {
        let at = utc(2024, 3, 15, 9, 0, 0);
        let events = vec![event(at, at)];
        let window = TimeWindow::spanning(&events).unwrap();
        assert!(window.overlaps_event(&events[0]));
    }

    #[test]
    fn spanning_tolerates_inverted_events() {
        let events = vec![event(utc(2024, 3, 15, 10, 0, 0), utc(2024, 3, 15, 9, 0, 0))];
        let window = TimeWindow::spanning(&events).unwrap();
        assert_eq!(window.start, utc(2024, 3, 15, 10, 0, 0));
        assert!(window.contains(utc(2024, 3, 15, 10, 0, 0)));
    }

    #[test]
    fn display() {
        let window = TimeWindow::new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0));
        assert_eq!(window.to_string(), "[2025-02-05T09:00:00Z, 2025-02-05T17:00:00Z)");
    }

    #[test]
    fn serde_roundtrip() {
        let window = TimeWindow::new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0));
        let json = serde_json::to_string(&window).unwrap();
        let parsed: TimeWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(window, parsed);
    }
}

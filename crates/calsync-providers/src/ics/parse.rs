//! iCalendar parsing into [`Event`]s.

use std::collections::{HashMap, HashSet};

use calsync_core::{Event, TimeWindow};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component, Property};
use rrule::RRuleSet;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

use super::timezone::resolve_tzid;

/// Upper bound on occurrences generated per recurring event.
const MAX_OCCURRENCES: u16 = 1000;

/// A `DTSTART`/`DTEND`/`RECURRENCE-ID`/`EXDATE` value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcsTime {
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    Zoned { local: NaiveDateTime, tz: Tz },
    /// No zone at all; interpreted as UTC.
    Floating(NaiveDateTime),
}

impl IcsTime {
    fn is_date(&self) -> bool {
        matches!(self, IcsTime::Date(_))
    }

    fn to_utc(self) -> Option<DateTime<Utc>> {
        match self {
            IcsTime::Date(d) => Some(d.and_hms_opt(0, 0, 0)?.and_utc()),
            IcsTime::Utc(dt) => Some(dt),
            IcsTime::Floating(local) => Some(local.and_utc()),
            IcsTime::Zoned { local, tz } => tz
                .from_local_datetime(&local)
                .earliest()
                // Nonexistent local time (spring-forward gap): move past it.
                .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// The value as an rrule `DTSTART` line.
    fn dtstart_line(self) -> String {
        match self {
            IcsTime::Date(d) => format!("DTSTART:{}T000000Z", d.format("%Y%m%d")),
            IcsTime::Utc(dt) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
            IcsTime::Floating(local) => format!("DTSTART:{}Z", local.format("%Y%m%dT%H%M%S")),
            IcsTime::Zoned { local, tz } => format!(
                "DTSTART;TZID={}:{}",
                tz.name(),
                local.format("%Y%m%dT%H%M%S")
            ),
        }
    }
}

/// One `VEVENT` before recurrence expansion.
#[derive(Debug, Clone)]
struct RawEvent {
    uid: String,
    title: String,
    notes: Option<String>,
    start: IcsTime,
    start_utc: DateTime<Utc>,
    stop_utc: DateTime<Utc>,
    rrule: Option<String>,
    exdates: Vec<DateTime<Utc>>,
    recurrence_id: Option<DateTime<Utc>>,
}

impl RawEvent {
    fn duration(&self) -> Duration {
        self.stop_utc - self.start_utc
    }

    fn to_event(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> Event {
        let event = Event::new(self.title.clone(), start, stop).with_uid(self.uid.clone());
        match &self.notes {
            Some(notes) => event.with_notes(notes.clone()),
            None => event,
        }
    }
}

/// Parses an iCalendar document and returns the events overlapping `window`,
/// recurring events expanded, in no particular order.
///
/// All-day and cancelled events are skipped. A `TZID` that names no known
/// zone fails the whole document.
pub fn parse_calendar(content: &str, window: TimeWindow) -> ProviderResult<Vec<Event>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| ProviderError::data(format!("failed to parse calendar: {e}")))?;

    let mut raw = Vec::new();
    for component in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        if let Some(event) = parse_vevent(component)? {
            raw.push(event);
        }
    }

    // Occurrences replaced by a RECURRENCE-ID override, keyed by uid.
    let mut overridden: HashMap<&str, HashSet<DateTime<Utc>>> = HashMap::new();
    for event in &raw {
        if let Some(recurrence_id) = event.recurrence_id {
            overridden
                .entry(event.uid.as_str())
                .or_default()
                .insert(recurrence_id);
        }
    }

    let mut events = Vec::new();
    for event in &raw {
        match &event.rrule {
            Some(rule) if event.recurrence_id.is_none() => {
                let skip = overridden.get(event.uid.as_str());
                events.extend(expand(event, rule, window, skip)?);
            }
            _ => {
                if window.overlaps(event.start_utc, event.stop_utc) {
                    events.push(event.to_event(event.start_utc, event.stop_utc));
                }
            }
        }
    }

    debug!(count = events.len(), window = %window, "parsed ICS events");
    Ok(events)
}

fn parse_vevent(component: &Component<'_>) -> ProviderResult<Option<RawEvent>> {
    let uid = component
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let title = component
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_default();

    if component
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"))
    {
        debug!(uid = %uid, title = %title, "skipping cancelled event");
        return Ok(None);
    }

    let dtstart = component
        .find_prop("DTSTART")
        .ok_or_else(|| ProviderError::data(format!("event {uid:?} has no DTSTART")))?;
    let start = parse_time(dtstart)?;
    if start.is_date() {
        debug!(uid = %uid, title = %title, "skipping all-day event");
        return Ok(None);
    }
    let start_utc = to_utc(start, &uid)?;

    let stop_utc = match component.find_prop("DTEND") {
        Some(dtend) => to_utc(parse_time(dtend)?, &uid)?,
        None => match component.find_prop("DURATION") {
            Some(duration) => {
                let value = duration.val.as_ref();
                let delta = parse_duration(value).map_err(|e| {
                    ProviderError::data(format!(
                        "event {uid:?} has an invalid DURATION {value:?}: {}",
                        e.message()
                    ))
                })?;
                start_utc.checked_add_signed(delta).ok_or_else(|| {
                    ProviderError::data(format!(
                        "event {uid:?} has a DURATION {value:?} past the representable range"
                    ))
                })?
            }
            None => start_utc,
        },
    };

    let mut exdates = Vec::new();
    for prop in component.properties.iter().filter(|p| p.name == "EXDATE") {
        for value in prop.val.as_ref().split(',').map(str::trim).filter(|v| !v.is_empty()) {
            exdates.push(to_utc(parse_value(prop, value)?, &uid)?);
        }
    }

    let recurrence_id = component
        .find_prop("RECURRENCE-ID")
        .map(|p| parse_time(p).and_then(|t| to_utc(t, &uid)))
        .transpose()?;

    Ok(Some(RawEvent {
        notes: component
            .find_prop("DESCRIPTION")
            .map(|p| unescape_text(p.val.as_ref())),
        rrule: component.find_prop("RRULE").map(|p| p.val.to_string()),
        uid,
        title,
        start,
        start_utc,
        stop_utc,
        exdates,
        recurrence_id,
    }))
}

fn to_utc(time: IcsTime, uid: &str) -> ProviderResult<DateTime<Utc>> {
    time.to_utc()
        .ok_or_else(|| ProviderError::data(format!("event {uid:?} has an unrepresentable time")))
}

fn param<'a>(prop: &'a Property<'_>, key: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref())
        .map(|v| v.as_ref())
}

fn parse_time(prop: &Property<'_>) -> ProviderResult<IcsTime> {
    parse_value(prop, prop.val.as_ref().trim())
}

/// Parses one date or date-time value using the property's `VALUE` and
/// `TZID` parameters.
fn parse_value(prop: &Property<'_>, value: &str) -> ProviderResult<IcsTime> {
    let invalid = || {
        ProviderError::data(format!(
            "invalid {} value {:?}",
            prop.name.as_ref(),
            value
        ))
    };

    if param(prop, "VALUE") == Some("DATE") || value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(IcsTime::Date)
            .map_err(|_| invalid());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .map(|dt| IcsTime::Utc(dt.and_utc()))
            .map_err(|_| invalid());
    }

    let local = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    match param(prop, "TZID") {
        Some(tzid) => {
            let tz = resolve_tzid(tzid).ok_or_else(|| {
                warn!(tzid = %tzid, "timezone not found in mapping");
                ProviderError::data(format!("unknown timezone {tzid:?}"))
            })?;
            Ok(IcsTime::Zoned { local, tz })
        }
        None => Ok(IcsTime::Floating(local)),
    }
}

/// Expands a recurring master into the occurrences overlapping `window`,
/// leaving out excluded dates and occurrences replaced by overrides.
fn expand(
    master: &RawEvent,
    rule: &str,
    window: TimeWindow,
    overridden: Option<&HashSet<DateTime<Utc>>>,
) -> ProviderResult<Vec<Event>> {
    let rrule_str = format!("{}\nRRULE:{}", master.start.dtstart_line(), rule);
    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
        ProviderError::data(format!(
            "failed to parse RRULE for event {:?}: {}",
            master.uid, e
        ))
    })?;

    let duration = master.duration();
    let tz: rrule::Tz = Utc.into();
    // `after`/`before` are exclusive; widen so occurrences that started
    // before the window but are still running are included.
    let after = (window.start - duration - Duration::seconds(1)).with_timezone(&tz);
    let before = window.end.with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(
            uid = %master.uid,
            limit = MAX_OCCURRENCES,
            "recurrence expansion truncated"
        );
    }

    let events = result
        .dates
        .iter()
        .map(|occurrence| occurrence.with_timezone(&Utc))
        .filter(|start| !master.exdates.contains(start))
        .filter(|start| overridden.is_none_or(|skip| !skip.contains(start)))
        .map(|start| (start, start + duration))
        .filter(|(start, stop)| window.overlaps(*start, *stop))
        .map(|(start, stop)| master.to_event(start, stop))
        .collect();
    Ok(events)
}

/// Parses an RFC 5545 `DURATION` value such as `PT1H30M`, `P1D` or `-PT15M`.
///
/// Year and month components have no fixed length and are rejected.
fn parse_duration(value: &str) -> ProviderResult<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let parsed = iso8601::duration(rest).map_err(ProviderError::data)?;

    let out_of_range = || ProviderError::data("duration out of range");
    let total = match parsed {
        iso8601::Duration::Weeks(weeks) => {
            Duration::try_weeks(i64::from(weeks)).ok_or_else(out_of_range)?
        }
        iso8601::Duration::YMDHMS {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
        } => {
            if year != 0 || month != 0 {
                return Err(ProviderError::data("year and month durations are not allowed"));
            }
            [
                Duration::try_days(i64::from(day)),
                Duration::try_hours(i64::from(hour)),
                Duration::try_minutes(i64::from(minute)),
                Duration::try_seconds(i64::from(second)),
                Duration::try_milliseconds(i64::from(millisecond)),
            ]
            .into_iter()
            .try_fold(Duration::zero(), |total, part| total.checked_add(&part?))
            .ok_or_else(out_of_range)?
        }
    };
    Ok(if negative { -total } else { total })
}

/// Reverses RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use chrono::TimeZone;

    fn window(start: (i32, u32, u32), days: i64) -> TimeWindow {
        TimeWindow::from_duration(
            Utc.with_ymd_and_hms(start.0, start.1, start.2, 0, 0, 0).unwrap(),
            Duration::days(days),
        )
    }

    fn wrap(events: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{}END:VCALENDAR\r\n",
            events.replace('\n', "\r\n")
        )
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn windows_timezone_is_resolved() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:040000008200E00074C5B7101A82E008
SUMMARY:Weekly sync
DTSTART;TZID=Pacific Standard Time:20231004T090000
DTEND;TZID=Pacific Standard Time:20231004T093000
END:VEVENT
",
        );

        let events = parse_calendar(&ics, window((2023, 10, 1), 7)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Weekly sync");
        assert_eq!(events[0].uid, "040000008200E00074C5B7101A82E008");
        assert_eq!(events[0].start, utc(2023, 10, 4, 16, 0));
        assert_eq!(events[0].stop, utc(2023, 10, 4, 16, 30));
    }

    #[test]
    fn events_outside_window_are_dropped() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:a
SUMMARY:Inside
DTSTART:20240110T100000Z
DTEND:20240110T110000Z
END:VEVENT
BEGIN:VEVENT
UID:b
SUMMARY:Before
DTSTART:20231201T100000Z
DTEND:20231201T110000Z
END:VEVENT
BEGIN:VEVENT
UID:c
SUMMARY:Straddling
DTSTART:20240108T230000Z
DTEND:20240109T010000Z
END:VEVENT
",
        );

        let mut titles: Vec<_> = parse_calendar(&ics, window((2024, 1, 9), 7))
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Inside", "Straddling"]);
    }

    #[test]
    fn all_day_and_cancelled_events_are_skipped() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:holiday
SUMMARY:Holiday
DTSTART;VALUE=DATE:20240110
DTEND;VALUE=DATE:20240111
END:VEVENT
BEGIN:VEVENT
UID:gone
SUMMARY:Cancelled meeting
STATUS:CANCELLED
DTSTART:20240110T100000Z
DTEND:20240110T110000Z
END:VEVENT
",
        );

        assert!(parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap().is_empty());
    }

    #[test]
    fn unknown_timezone_fails_the_document() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:a
SUMMARY:Somewhere
DTSTART;TZID=Mars Standard Time:20240110T100000
DTEND;TZID=Mars Standard Time:20240110T110000
END:VEVENT
",
        );

        let err = parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::DataError);
        assert!(err.message().contains("Mars Standard Time"));
    }

    #[test]
    fn description_becomes_unescaped_notes() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:a
SUMMARY:Review\\, part 2
DESCRIPTION:Agenda:\\n1. status\\; 2. plans
DTSTART:20240110T100000Z
DTEND:20240110T110000Z
END:VEVENT
",
        );

        let events = parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap();
        assert_eq!(events[0].title, "Review, part 2");
        assert_eq!(events[0].notes.as_deref(), Some("Agenda:\n1. status; 2. plans"));
    }

    #[test]
    fn duration_is_used_without_dtend() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:a
SUMMARY:Standup
DTSTART:20240110T100000Z
DURATION:PT15M
END:VEVENT
",
        );

        let events = parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap();
        assert_eq!(events[0].stop, utc(2024, 1, 10, 10, 15));
    }

    #[test]
    fn floating_times_are_utc() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:a
SUMMARY:Floating
DTSTART:20240110T100000
DTEND:20240110T110000
END:VEVENT
",
        );

        let events = parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap();
        assert_eq!(events[0].start, utc(2024, 1, 10, 10, 0));
    }

    #[test]
    fn recurring_events_expand_within_window_with_exdates() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:weekly
SUMMARY:Weekly
DTSTART;TZID=Europe/Berlin:20240101T100000
DTEND;TZID=Europe/Berlin:20240101T110000
RRULE:FREQ=WEEKLY;BYDAY=MO
EXDATE;TZID=Europe/Berlin:20240115T100000
END:VEVENT
",
        );

        let events = parse_calendar(&ics, window((2024, 1, 7), 21)).unwrap();
        let starts: Vec<_> = events.iter().map(|e| e.start).collect();
        assert_eq!(
            starts,
            vec![utc(2024, 1, 8, 9, 0), utc(2024, 1, 22, 9, 0)]
        );
        assert!(events.iter().all(|e| e.uid == "weekly"));
        assert!(events.iter().all(|e| e.stop - e.start == Duration::hours(1)));
    }

    #[test]
    fn recurrence_id_override_replaces_occurrence() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:daily
SUMMARY:Daily
DTSTART:20240110T090000Z
DTEND:20240110T093000Z
RRULE:FREQ=DAILY;COUNT=3
END:VEVENT
BEGIN:VEVENT
UID:daily
RECURRENCE-ID:20240111T090000Z
SUMMARY:Daily (moved)
DTSTART:20240111T140000Z
DTEND:20240111T143000Z
END:VEVENT
",
        );

        let mut events = parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap();
        events.sort_by(|a, b| a.cmp_start(b));
        let got: Vec<_> = events.iter().map(|e| (e.title.as_str(), e.start)).collect();
        assert_eq!(
            got,
            vec![
                ("Daily", utc(2024, 1, 10, 9, 0)),
                ("Daily (moved)", utc(2024, 1, 11, 14, 0)),
                ("Daily", utc(2024, 1, 12, 9, 0)),
            ]
        );
    }

    #[test]
    fn occurrence_running_into_window_is_included() {
        let ics = wrap(
            "BEGIN:VEVENT
UID:night
SUMMARY:Night shift
DTSTART:20240101T220000Z
DTEND:20240102T060000Z
RRULE:FREQ=DAILY
END:VEVENT
",
        );

        let events = parse_calendar(&ics, window((2024, 1, 10), 1)).unwrap();
        let starts: Vec<_> = events.iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![utc(2024, 1, 9, 22, 0), utc(2024, 1, 10, 22, 0)]);
    }

    #[test]
    fn duration_values() {
        assert_eq!(parse_duration("PT1H30M").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("P1D").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("P1W").unwrap(), Duration::weeks(1));
        assert_eq!(parse_duration("-PT15M").unwrap(), Duration::minutes(-15));
        assert_eq!(parse_duration("+PT15M").unwrap(), Duration::minutes(15));
        assert_eq!(parse_duration("P1DT2H").unwrap(), Duration::hours(26));
        assert!(parse_duration("1H").is_err());
        assert!(parse_duration("P1M").is_err());
    }

    #[test]
    fn huge_duration_is_a_data_error() {
        for value in ["P99999999999999D", "P4294967295W"] {
            let ics = wrap(&format!(
                "BEGIN:VEVENT
UID:a
SUMMARY:Forever
DTSTART:20240110T100000Z
DURATION:{value}
END:VEVENT
"
            ));

            let err = parse_calendar(&ics, window((2024, 1, 9), 7)).unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::DataError, "{value}");
        }
    }

    #[test]
    fn text_unescaping() {
        assert_eq!(unescape_text(r"a\,b\;c\\d\ne"), "a,b;c\\d\ne");
        assert_eq!(unescape_text("plain"), "plain");
        assert_eq!(unescape_text("trailing\\"), "trailing\\");
    }
}

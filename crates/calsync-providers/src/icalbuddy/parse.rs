//! Parser for icalBuddy's text output.
//!
//! With the arguments [`super::IcalBuddyCalendar`] passes, each event looks
//! like:
//!
//! ```text
//! →SiteCon 2023 Day 2 BLR: Talks
//!     notes: line1
//!         line2
//!     Oct 4, 2023 at 22:30 -0700 - Oct 5, 2023 at 02:50 -0700
//!     uid: 2933E1DE-637E-40FF-8346-39C009EBA8EE
//! ```
//!
//! The end of the time line omits the date when the event ends on its start
//! day (`Aug 9, 2023 at 16:30 -0700 - 17:00 -0700`). All-day events have no
//! ` at ` in their time line.

use std::sync::LazyLock;

use calsync_core::Event;
use chrono::DateTime;
use regex::Regex;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Bullet printed before every event.
pub(crate) const BULLET: &str = "→";

/// `chrono` layout of a rendered date and time, e.g. `Aug 9, 2023 16:30 -0700`.
const TIME_LAYOUT: &str = "%b %d, %Y %H:%M %z";

const FIELD_INDENT: &str = "    ";
const NOTES_PREFIX: &str = "    notes: ";
const NOTES_CONTINUATION: &str = "        ";
const UID_PREFIX: &str = "    uid: ";

/// `<date> at <time> - [<date> at ]<time>`
static TIME_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<date>.+?) at (?P<start>\d{1,2}:\d{2} [+-]\d{4}) - (?:(?P<end_date>.+?) at )?(?P<end>\d{1,2}:\d{2} [+-]\d{4})$",
    )
    .expect("Invalid time line regex")
});

/// Parses the full output. All-day events are skipped; any other malformed
/// event fails the whole output.
pub fn parse_output(output: &str) -> ProviderResult<Vec<Event>> {
    let mut events = Vec::new();
    for chunk in output.split(BULLET) {
        if chunk.trim().is_empty() {
            continue;
        }
        match parse_event(chunk) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => debug!(event = %chunk.lines().next().unwrap_or_default(), "skipping all-day event"),
            Err(e) => {
                return Err(ProviderError::data(format!(
                    "parsing event {:?}: {}",
                    chunk.trim_end(),
                    e.message()
                )))
            }
        }
    }
    Ok(events)
}

/// Parses one event chunk, returning `None` for all-day events.
pub fn parse_event(chunk: &str) -> ProviderResult<Option<Event>> {
    let mut lines = chunk.lines().map(|l| l.trim_end_matches('\r'));

    let title = lines
        .next()
        .ok_or_else(|| ProviderError::data("missing title"))?
        .to_string();

    let mut line = lines
        .next()
        .ok_or_else(|| ProviderError::data("missing time"))?;

    let mut notes = None;
    if let Some(first) = line.strip_prefix(NOTES_PREFIX) {
        let mut body = vec![first];
        loop {
            line = lines
                .next()
                .ok_or_else(|| ProviderError::data("missing time after notes"))?;
            match line.strip_prefix(NOTES_CONTINUATION) {
                Some(more) => body.push(more),
                None => break,
            }
        }
        notes = Some(body.join("\n"));
    }

    let time_line = line
        .strip_prefix(FIELD_INDENT)
        .ok_or_else(|| ProviderError::data(format!("unexpected line {line:?}")))?;
    if !time_line.contains(" at ") {
        return Ok(None);
    }
    let (start, stop) = parse_time_line(time_line)?;

    let uid = lines
        .find_map(|l| l.strip_prefix(UID_PREFIX))
        .ok_or_else(|| ProviderError::data("missing uid"))?
        .trim();

    let event = Event::new(title, start, stop).with_uid(uid);
    Ok(Some(match notes {
        Some(notes) => event.with_notes(notes),
        None => event,
    }))
}

type Interval = (
    DateTime<chrono::FixedOffset>,
    DateTime<chrono::FixedOffset>,
);

fn parse_time_line(line: &str) -> ProviderResult<Interval> {
    let caps = TIME_LINE_REGEX
        .captures(line)
        .ok_or_else(|| ProviderError::data(format!("unrecognized time line {line:?}")))?;

    let date = &caps["date"];
    let end_date = caps.name("end_date").map_or(date, |m| m.as_str());

    let start = parse_time(date, &caps["start"], "start")?;
    let stop = parse_time(end_date, &caps["end"], "stop")?;
    Ok((start, stop))
}

fn parse_time(
    date: &str,
    time: &str,
    what: &str,
) -> ProviderResult<DateTime<chrono::FixedOffset>> {
    let rendered = format!("{date} {time}");
    DateTime::parse_from_str(&rendered, TIME_LAYOUT).map_err(|e| {
        ProviderError::data(format!("parsing {what} time {rendered:?}: {e}")).with_source(e)
    })
}

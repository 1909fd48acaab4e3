//! Event types for synchronization.
//!
//! This module provides the types the sync engine reasons about:
//! - [`Event`]: a timed event assembled from a source calendar
//! - [`DestinationEvent`]: an event as stored in a destination calendar
//! - [`Fingerprint`]: the content hash used to recognise identical events

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Marker stored on every event this tool creates in a destination calendar.
///
/// Only events carrying this tag are ever deleted.
pub const MANAGED_TAG: &str = "calsync";

/// Version prefix of the fingerprint scheme.
pub const FINGERPRINT_SCHEME: &str = "v1";

/// Field separator for the fingerprint input (ASCII unit separator).
const FIELD_SEPARATOR: char = '\u{1f}';

/// A timed calendar event, normalized to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The event title/summary.
    pub title: String,
    /// Free-form description, if any.
    pub notes: Option<String>,
    /// When the event starts.
    pub start: DateTime<Utc>,
    /// When the event stops.
    pub stop: DateTime<Utc>,
    /// Identifier from the originating calendar (may be empty).
    pub uid: String,
}

impl Event {
    /// Creates an event from start/stop instants in any timezone.
    pub fn new<Tz: TimeZone>(title: impl Into<String>, start: DateTime<Tz>, stop: DateTime<Tz>) -> Self {
        Self {
            title: title.into(),
            notes: None,
            start: start.with_timezone(&Utc),
            stop: stop.with_timezone(&Utc),
            uid: String::new(),
        }
    }

    /// Builder method to set the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builder method to set the source uid.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Returns the notes, treating a missing value as empty.
    pub fn notes_or_empty(&self) -> &str {
        self.notes.as_deref().unwrap_or_default()
    }

    /// Computes the content fingerprint of this event.
    ///
    /// Title, start, stop and notes participate; `uid` does not. Instants are
    /// rendered in UTC at whole-second precision so the same moment written
    /// with different offsets hashes identically.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        let start = canonical_instant(&self.start);
        let stop = canonical_instant(&self.stop);
        let fields = [
            FINGERPRINT_SCHEME,
            self.title.as_str(),
            start.as_str(),
            stop.as_str(),
            self.notes_or_empty(),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                let mut buf = [0u8; 4];
                hasher.update(FIELD_SEPARATOR.encode_utf8(&mut buf).as_bytes());
            }
            hasher.update(field.as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Orders two events by start time.
    pub fn cmp_start(&self, other: &Event) -> Ordering {
        self.start.cmp(&other.start)
    }

    /// Short human-readable label used in logs and errors.
    pub fn label(&self) -> String {
        format!("{:?} at {}", self.title, canonical_instant(&self.start))
    }
}

fn canonical_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Hex-encoded SHA-256 content hash of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event as it exists in a destination calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEvent {
    /// Provider-assigned identifier, used for deletion.
    pub id: String,
    /// The event content.
    #[serde(flatten)]
    pub event: Event,
    /// Marker naming the tool that created this event, if any.
    pub managed_by: Option<String>,
}

impl DestinationEvent {
    /// Wraps an event stored under `id` without a managed marker.
    pub fn new(id: impl Into<String>, event: Event) -> Self {
        Self {
            id: id.into(),
            event,
            managed_by: None,
        }
    }

    /// Wraps an event stored under `id` and tagged as created by this tool.
    pub fn managed(id: impl Into<String>, event: Event) -> Self {
        Self {
            id: id.into(),
            event,
            managed_by: Some(MANAGED_TAG.to_string()),
        }
    }

    /// Builder method to set the marker verbatim.
    pub fn with_managed_by(mut self, tag: impl Into<String>) -> Self {
        self.managed_by = Some(tag.into());
        self
    }

    /// Returns true if this tool created the event and may delete it.
    pub fn is_managed(&self) -> bool {
        self.managed_by.as_deref() == Some(MANAGED_TAG)
    }

    /// Content fingerprint of the wrapped event.
    pub fn fingerprint(&self) -> Fingerprint {
        self.event.fingerprint()
    }
}

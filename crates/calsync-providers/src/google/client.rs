//! Google Calendar API v3 client.
//!
//! Thin HTTP layer: request building, status mapping and conversion between
//! the API's JSON events and [`DestinationEvent`].

use std::collections::HashMap;
use std::time::Duration;

use calsync_core::{DestinationEvent, Event, MANAGED_TAG, TimeWindow};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Largest page the events.list endpoint accepts.
const PAGE_SIZE: &str = "2500";

/// Private extended property carrying the source event uid.
const UID_PROPERTY: &str = "uid";

/// Link stored next to the managed tag in the event's `source` field.
pub(crate) const SOURCE_URL: &str = env!("CARGO_PKG_REPOSITORY");

/// Google Calendar API client bound to one access token.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("calsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            http_client,
            access_token: access_token.into(),
        })
    }

    /// Updates the access token (after refresh).
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    /// Lists timed, non-cancelled events overlapping `window`, following
    /// every page.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> ProviderResult<Vec<DestinationEvent>> {
        let url = events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("timeMin", rfc3339(window.start)),
                    ("timeMax", rfc3339(window.end)),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("showDeleted", "false".to_string()),
                    ("maxResults", PAGE_SIZE.to_string()),
                ]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let body = send(request, "list events").await?;
            let page: EventListResponse = parse(&body)?;
            pages += 1;

            for item in page.items {
                events.extend(item.into_destination_event()?);
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar_id, pages, count = events.len(), "listed events");
        Ok(events)
    }

    /// Inserts `event`, tagged as managed, and returns the stored copy.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &Event,
    ) -> ProviderResult<DestinationEvent> {
        let request = self
            .http_client
            .post(events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(&NewApiEvent::managed(event));

        let body = send(request, "insert event").await?;
        let created: ApiEvent = parse(&body)?;
        let id = created
            .id
            .ok_or_else(|| ProviderError::invalid_response("inserted event has no id"))?;

        Ok(DestinationEvent::managed(id, event.clone()))
    }

    /// Deletes the event stored under `event_id`.
    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> ProviderResult<()> {
        let url = format!("{}/{}", events_url(calendar_id), urlencoding::encode(event_id));
        let request = self.http_client.delete(url).bearer_auth(&self.access_token);
        send(request, "delete event").await?;
        Ok(())
    }

    /// Lists the calendars visible to the authenticated account.
    pub async fn list_calendars(&self) -> ProviderResult<Vec<CalendarListEntry>> {
        let request = self
            .http_client
            .get(format!("{}/users/me/calendarList", CALENDAR_API_BASE))
            .bearer_auth(&self.access_token);

        let body = send(request, "list calendars").await?;
        let list: CalendarListResponse = parse(&body)?;
        Ok(list.items)
    }
}

fn events_url(calendar_id: &str) -> String {
    format!(
        "{}/calendars/{}/events",
        CALENDAR_API_BASE,
        urlencoding::encode(calendar_id)
    )
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sends `request` and returns the body of a successful response.
async fn send(request: reqwest::RequestBuilder, action: &str) -> ProviderResult<String> {
    let response = request.send().await.map_err(|e| {
        let message = if e.is_timeout() {
            format!("{}: request timeout", action)
        } else if e.is_connect() {
            format!("{}: connection failed: {}", action, e)
        } else {
            format!("{}: request failed: {}", action, e)
        };
        ProviderError::network(message).with_source(e)
    })?;

    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("{}: failed to read response: {}", action, e)))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(status.as_u16(), &body, retry_after, action))
    }
}

/// Maps a non-success HTTP status to a classified error.
fn status_error(status: u16, body: &str, retry_after: Option<u64>, action: &str) -> ProviderError {
    match status {
        400 => ProviderError::bad_request(format!("{}: {}", action, body)),
        401 => ProviderError::authentication(format!(
            "{}: access token expired or invalid, delete the token file and authenticate again",
            action
        )),
        403 if body.contains("rateLimitExceeded") => {
            ProviderError::rate_limited(format!("{}: rate limit exceeded", action))
        }
        403 => ProviderError::authorization(format!("{}: access denied: {}", action, body)),
        404 | 410 => ProviderError::not_found(format!("{}: not found", action)),
        429 => ProviderError::rate_limited(format!(
            "{}: rate limit exceeded{}",
            action,
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )),
        _ => ProviderError::server(format!("{}: API error ({}): {}", action, status, body)),
    }
}

fn parse<'de, T: Deserialize<'de>>(body: &'de str) -> ProviderResult<T> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::invalid_response(format!("failed to parse response: {}", e)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    status: Option<String>,
    source: Option<ApiSource>,
    extended_properties: Option<ApiExtendedProperties>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiSource {
    title: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiExtendedProperties {
    #[serde(default)]
    private: HashMap<String, String>,
}

impl ApiEvent {
    /// Converts a listed event; all-day and cancelled events yield `None`.
    ///
    /// A timed event whose times do not parse fails the whole listing, since
    /// dropping it would hide a managed event from reconciliation.
    fn into_destination_event(self) -> ProviderResult<Option<DestinationEvent>> {
        if self.status.as_deref() == Some("cancelled") {
            return Ok(None);
        }
        let id = self
            .id
            .ok_or_else(|| ProviderError::invalid_response("listed event has no id"))?;

        let (Some(start), Some(end)) = (self.start.date_time, self.end.date_time) else {
            debug!(id = %id, "skipping all-day event");
            return Ok(None);
        };
        let parse_time = |field: &str, value: &str| {
            DateTime::parse_from_rfc3339(value).map_err(|e| {
                ProviderError::invalid_response(format!(
                    "event {id:?} has an unparseable {field} time {value:?}: {e}"
                ))
            })
        };
        let start = parse_time("start", &start)?;
        let end = parse_time("end", &end)?;

        let mut event = Event::new(self.summary.unwrap_or_default(), start, end);
        event.notes = self.description.filter(|d| !d.is_empty());
        if let Some(mut props) = self.extended_properties {
            event.uid = props.private.remove(UID_PROPERTY).unwrap_or_default();
        }

        Ok(Some(DestinationEvent {
            id,
            event,
            managed_by: self.source.and_then(|s| s.title),
        }))
    }
}

/// Body of an events.insert request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewApiEvent<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: ApiEventTime,
    end: ApiEventTime,
    source: ApiSource,
    extended_properties: ApiExtendedProperties,
}

impl<'a> NewApiEvent<'a> {
    fn managed(event: &'a Event) -> Self {
        let at = |dt| ApiEventTime {
            date: None,
            date_time: Some(rfc3339(dt)),
        };
        Self {
            summary: &event.title,
            description: event.notes.as_deref().filter(|n| !n.is_empty()),
            start: at(event.start),
            end: at(event.stop),
            source: ApiSource {
                title: Some(MANAGED_TAG.to_string()),
                url: Some(SOURCE_URL.to_string()),
            },
            extended_properties: ApiExtendedProperties {
                private: HashMap::from([(UID_PROPERTY.to_string(), event.uid.clone())]),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

/// A calendar from the account's calendar list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub primary: bool,
}

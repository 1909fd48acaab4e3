//! Remote iCalendar feed source.
//!
//! [`IcsCalendar`] downloads a published `.ics` feed on every read and
//! returns the timed events overlapping the requested window. Exchange feeds
//! use Windows zone names; see [`resolve_tzid`].

mod parse;
mod timezone;

use std::time::Duration;

use calsync_core::{Event, TimeWindow};
use tracing::{debug, info};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, EventSource};

pub use parse::parse_calendar;
pub use timezone::resolve_tzid;

/// Default HTTP timeout for feed downloads.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A read-only calendar published as an iCalendar feed.
#[derive(Debug)]
pub struct IcsCalendar {
    name: String,
    url: Url,
    http_client: reqwest::Client,
}

impl IcsCalendar {
    /// Creates a feed source. `webcal://` URLs are fetched over HTTPS.
    pub fn new(name: impl Into<String>, url: &str) -> ProviderResult<Self> {
        let name = name.into();
        let url = feed_url(url).map_err(|e| e.with_provider(&name))?;

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("calsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            name,
            url,
            http_client,
        })
    }

    /// The URL actually fetched.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> ProviderResult<String> {
        debug!(calendar = %self.name, url = %self.url, "fetching ICS feed");

        let response = self
            .http_client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("failed to fetch calendar: {}", e)).with_source(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::server(format!(
                "failed to fetch calendar: HTTP {}",
                status
            )));
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read calendar: {}", e)).with_source(e)
        })?;
        check_body(&body)?;
        Ok(body)
    }
}

impl EventSource for IcsCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        Box::pin(async move {
            let body = self.fetch().await.map_err(|e| e.with_provider(&self.name))?;
            let events =
                parse_calendar(&body, window).map_err(|e| e.with_provider(&self.name))?;
            info!(calendar = %self.name, count = events.len(), "fetched ICS events");
            Ok(events)
        })
    }
}

/// Validates a feed URL, rewriting `webcal://` to `https://`.
fn feed_url(raw: &str) -> ProviderResult<Url> {
    let raw = raw.trim();
    let rewritten = match raw.strip_prefix("webcal://") {
        Some(rest) => format!("https://{rest}"),
        None => raw.to_string(),
    };

    let url = Url::parse(&rewritten).map_err(|e| {
        ProviderError::configuration(format!("invalid calendar URL {raw:?}: {e}")).with_source(e)
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProviderError::configuration(format!(
            "unsupported calendar URL scheme {other:?}, expected http, https or webcal"
        ))),
    }
}

/// Rejects bodies that are obviously not iCalendar, such as login pages.
fn check_body(body: &str) -> ProviderResult<()> {
    let head = body.trim_start();
    let lower: String = head.chars().take(64).collect::<String>().to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Err(ProviderError::invalid_response(
            "feed returned an HTML page instead of a calendar, check the URL",
        ));
    }
    if !head.contains("BEGIN:VCALENDAR") {
        return Err(ProviderError::invalid_response(
            "feed response does not contain BEGIN:VCALENDAR",
        ));
    }
    Ok(())
}

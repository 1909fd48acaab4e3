//! Source and destination calendar traits.
//!
//! A sync run reads [`Event`]s from one or more [`EventSource`]s and
//! reconciles them into one or more [`EventDestination`]s. Backends handle
//! their own authentication, pagination and wire formats; the engine only
//! sees these traits.

use std::future::Future;
use std::pin::Pin;

use calsync_core::{DestinationEvent, Event, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// A boxed future for async trait methods.
///
/// Boxing keeps the traits object-safe so calendars can be held as
/// `Box<dyn EventSource>` in the registry.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A read-only calendar events are synchronized from.
pub trait EventSource: Send + Sync {
    /// Returns the configured name of this calendar (e.g., "mac", "ical").
    fn name(&self) -> &str;

    /// Fetches every timed event overlapping `window`.
    ///
    /// All-day events are skipped. Recurring events are expanded into
    /// individual occurrences.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on network/subprocess failures and on source
    /// data that cannot be interpreted.
    fn get_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>>;
}

/// A read/write calendar events are synchronized into.
pub trait EventDestination: Send + Sync {
    /// Returns the configured name of this calendar (e.g., "google").
    fn name(&self) -> &str;

    /// Lists every event overlapping `window`, managed or not.
    ///
    /// Pagination is handled internally; the returned list is complete.
    fn list_events(&self, window: TimeWindow)
    -> BoxFuture<'_, ProviderResult<Vec<DestinationEvent>>>;

    /// Creates `event`, tagged as managed by this tool.
    ///
    /// The event's `uid` is preserved in a backend-specific custom property.
    fn create_event<'a>(&'a self, event: &'a Event)
    -> BoxFuture<'a, ProviderResult<DestinationEvent>>;

    /// Deletes the event stored under `id`.
    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>>;
}

/// A calendar that fails every operation with the same error.
///
/// Stands in for a backend that could not be initialized.
#[derive(Debug)]
pub struct ErrorCalendar {
    name: String,
    error: ProviderError,
}

impl ErrorCalendar {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    fn fail<T: Send + 'static>(&self) -> BoxFuture<'_, ProviderResult<T>> {
        let error = self.error.duplicate().with_provider(&self.name);
        Box::pin(async move { Err(error) })
    }
}

impl EventSource for ErrorCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_events(&self, _window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        self.fail()
    }
}

impl EventDestination for ErrorCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_events(
        &self,
        _window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<DestinationEvent>>> {
        self.fail()
    }

    fn create_event<'a>(
        &'a self,
        _event: &'a Event,
    ) -> BoxFuture<'a, ProviderResult<DestinationEvent>> {
        self.fail()
    }

    fn delete_event<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        self.fail()
    }
}

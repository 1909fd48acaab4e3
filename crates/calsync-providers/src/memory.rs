//! In-process calendar backed by a vector.
//!
//! Implements both [`EventSource`] and [`EventDestination`]; every create and
//! delete is journaled so callers can assert on exactly what was written.
//! Failures can be injected per operation.

use std::sync::{Mutex, MutexGuard};

use calsync_core::{DestinationEvent, Event, TimeWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, EventDestination, EventSource};

#[derive(Debug, Default)]
struct State {
    events: Vec<DestinationEvent>,
    created: Vec<DestinationEvent>,
    deleted: Vec<String>,
    calls: Vec<String>,
    next_id: u64,
    fail_list: Option<ProviderError>,
    fail_create_on: Option<(usize, ProviderError)>,
    fail_delete_of: Option<(String, ProviderError)>,
}

/// A calendar held entirely in memory.
#[derive(Debug)]
pub struct MemoryCalendar {
    name: String,
    state: Mutex<State>,
}

impl MemoryCalendar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Builder method to seed existing events.
    pub fn with_events(self, events: impl IntoIterator<Item = DestinationEvent>) -> Self {
        self.lock().events.extend(events);
        self
    }

    /// Fail the next `list_events` call with `error`.
    pub fn fail_list(self, error: ProviderError) -> Self {
        self.lock().fail_list = Some(error);
        self
    }

    /// Fail the `n`th (zero-based) `create_event` call with `error`.
    pub fn fail_create_on(self, n: usize, error: ProviderError) -> Self {
        self.lock().fail_create_on = Some((n, error));
        self
    }

    /// Fail deleting the event stored under `id` with `error`.
    pub fn fail_delete_of(self, id: impl Into<String>, error: ProviderError) -> Self {
        self.lock().fail_delete_of = Some((id.into(), error));
        self
    }

    /// Events currently stored.
    pub fn events(&self) -> Vec<DestinationEvent> {
        self.lock().events.clone()
    }

    /// Events created through [`EventDestination::create_event`], in order.
    pub fn created(&self) -> Vec<DestinationEvent> {
        self.lock().created.clone()
    }

    /// Ids deleted through [`EventDestination::delete_event`], in order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Operation journal, e.g. `["list", "delete:a", "create:Standup"]`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSource for MemoryCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        let events = self
            .lock()
            .events
            .iter()
            .filter(|e| window.overlaps_event(&e.event))
            .map(|e| e.event.clone())
            .collect();
        Box::pin(async move { Ok(events) })
    }
}

impl EventDestination for MemoryCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<DestinationEvent>>> {
        let result = {
            let mut state = self.lock();
            state.calls.push("list".to_string());
            match state.fail_list.take() {
                Some(error) => Err(error.with_provider(&self.name)),
                None => Ok(state
                    .events
                    .iter()
                    .filter(|e| window.overlaps_event(&e.event))
                    .cloned()
                    .collect()),
            }
        };
        Box::pin(async move { result })
    }

    fn create_event<'a>(
        &'a self,
        event: &'a Event,
    ) -> BoxFuture<'a, ProviderResult<DestinationEvent>> {
        let result = {
            let mut state = self.lock();
            state.calls.push(format!("create:{}", event.title));
            let attempt = state.created.len();
            match state.fail_create_on.take() {
                Some((n, error)) if n == attempt => Err(error.with_provider(&self.name)),
                other => {
                    state.fail_create_on = other;
                    state.next_id += 1;
                    let stored =
                        DestinationEvent::managed(format!("{}-{}", self.name, state.next_id), event.clone());
                    state.events.push(stored.clone());
                    state.created.push(stored.clone());
                    Ok(stored)
                }
            }
        };
        Box::pin(async move { result })
    }

    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        let result = {
            let mut state = self.lock();
            state.calls.push(format!("delete:{id}"));
            match state.fail_delete_of.take() {
                Some((target, error)) if target == id => Err(error.with_provider(&self.name)),
                other => {
                    state.fail_delete_of = other;
                    match state.events.iter().position(|e| e.id == id) {
                        Some(pos) => {
                            state.events.remove(pos);
                            state.deleted.push(id.to_string());
                            Ok(())
                        }
                        None => Err(ProviderError::not_found(format!("event {id} not found"))
                            .with_provider(&self.name)),
                    }
                }
            }
        };
        Box::pin(async move { result })
    }
}

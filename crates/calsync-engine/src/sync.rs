//! Fingerprint reconciliation against one destination.

use std::future::Future;

use calsync_core::{DestinationEvent, Event, TimeWindow};
use calsync_providers::EventDestination;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::{DuplicateIndex, Observation};
use crate::error::{SyncError, SyncResult};

/// Options for one [`synchronize`] call.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Window to reconcile. Derived from the local events when `None`.
    pub window: Option<TimeWindow>,
    /// Stops the run between destination calls.
    pub cancel: CancellationToken,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of a successful [`synchronize`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Destination name.
    pub destination: String,
    /// Window that was reconciled.
    pub window: TimeWindow,
    /// Events created, in creation order.
    pub created: Vec<DestinationEvent>,
    /// Ids of managed events deleted as stale.
    pub deleted: Vec<String>,
    /// Destination events matched to a local event and left alone.
    pub kept: usize,
    /// Unmatched events not created by this tool.
    pub skipped_foreign: usize,
    /// Extra destination copies of an already matched event.
    pub skipped_duplicates: usize,
}

impl SyncReport {
    /// True if the run wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Makes `destination` mirror `local_events` inside the sync window.
///
/// Local events are sorted by start (stable). Destination events are walked
/// in listed order and each binds the first unmatched local event with the
/// same fingerprint, which keeps it. A destination event that binds nothing
/// is skipped as a duplicate if its fingerprint was already seen, deleted if
/// it is managed, and otherwise left alone as foreign. Local events left
/// unbound are then created.
///
/// The run stops at the first destination error. Writes made before the
/// error stay applied.
pub async fn synchronize(
    mut local_events: Vec<Event>,
    destination: &dyn EventDestination,
    options: SyncOptions,
) -> SyncResult<SyncReport> {
    let name = destination.name().to_string();
    local_events.sort_by(Event::cmp_start);

    let window = match options.window.or_else(|| TimeWindow::spanning(&local_events)) {
        Some(window) => window,
        None => return Err(SyncError::NoLocalEvents),
    };
    info!(
        destination = %name,
        window = %window,
        local = local_events.len(),
        "synchronizing"
    );

    let existing = guarded(&options.cancel, &name, || destination.list_events(window))
        .await?
        .map_err(|source| SyncError::List {
            destination: name.clone(),
            source,
        })?;
    debug!(destination = %name, count = existing.len(), "listed destination events");

    let mut report = SyncReport {
        destination: name.clone(),
        window,
        created: Vec::new(),
        deleted: Vec::new(),
        kept: 0,
        skipped_foreign: 0,
        skipped_duplicates: 0,
    };

    let mut index = DuplicateIndex::new(&local_events);
    for existing_event in &existing {
        match index.observe(&existing_event.fingerprint()) {
            Observation::Duplicate => {
                warn!(
                    destination = %name,
                    id = %existing_event.id,
                    event = %existing_event.event.label(),
                    "duplicate destination event, skipping"
                );
                report.skipped_duplicates += 1;
            }
            Observation::Matched(i) => {
                debug!(
                    destination = %name,
                    id = %existing_event.id,
                    local = i,
                    "event already present"
                );
                report.kept += 1;
            }
            Observation::Unmatched if existing_event.is_managed() => {
                info!(
                    destination = %name,
                    id = %existing_event.id,
                    event = %existing_event.event.label(),
                    "deleting stale event"
                );
                guarded(&options.cancel, &name, || {
                    destination.delete_event(&existing_event.id)
                })
                .await?
                .map_err(|source| SyncError::Delete {
                    destination: name.clone(),
                    id: existing_event.id.clone(),
                    title: existing_event.event.title.clone(),
                    source,
                })?;
                report.deleted.push(existing_event.id.clone());
            }
            Observation::Unmatched => {
                debug!(
                    destination = %name,
                    id = %existing_event.id,
                    managed_by = ?existing_event.managed_by,
                    "skipping foreign event"
                );
                report.skipped_foreign += 1;
            }
        }
    }

    for i in index.unmatched() {
        let event = &local_events[i];
        info!(destination = %name, event = %event.label(), "creating event");
        let created = guarded(&options.cancel, &name, || destination.create_event(event))
            .await?
            .map_err(|source| SyncError::Create {
                destination: name.clone(),
                title: event.title.clone(),
                start: event.start,
                source,
            })?;
        report.created.push(created);
    }

    info!(
        destination = %name,
        created = report.created.len(),
        deleted = report.deleted.len(),
        kept = report.kept,
        foreign = report.skipped_foreign,
        duplicates = report.skipped_duplicates,
        "synchronization complete"
    );
    Ok(report)
}

/// Runs one destination call unless `cancel` fires first.
///
/// The call is not started at all when the token is already cancelled.
pub(crate) async fn guarded<F, T>(
    cancel: &CancellationToken,
    destination: &str,
    call: impl FnOnce() -> F,
) -> SyncResult<T>
where
    F: Future<Output = T>,
{
    let cancelled = || SyncError::Cancelled {
        destination: destination.to_string(),
    };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        out = call() => Ok(out),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use calsync_core::MANAGED_TAG;
    use calsync_providers::{
        BoxFuture, MemoryCalendar, ProviderError, ProviderErrorCode, ProviderResult,
    };
    use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

    pub(crate) fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, 0, 0).unwrap()
    }

    pub(crate) fn local(title: &str, hour: u32) -> Event {
        Event::new(title, at(hour), at(hour) + Duration::minutes(30)).with_uid(format!("uid-{title}"))
    }

    pub(crate) fn managed(id: &str, title: &str, hour: u32) -> DestinationEvent {
        DestinationEvent::managed(id, local(title, hour))
    }

    pub(crate) fn foreign(id: &str, title: &str, hour: u32) -> DestinationEvent {
        DestinationEvent::new(id, local(title, hour))
    }

    #[tokio::test]
    async fn empty_destination_gets_every_event() {
        let dest = MemoryCalendar::new("dest");
        let report = synchronize(
            vec![local("B", 11), local("A", 10)],
            &dest,
            SyncOptions::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.created.len(), 2);
        assert!(report.deleted.is_empty());
        let titles: Vec<_> = dest.created().into_iter().map(|e| e.event.title).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert!(dest.created().iter().all(|e| e.managed_by.as_deref() == Some(MANAGED_TAG)));
        assert_eq!(dest.created()[0].event.uid, "uid-A");
    }

    #[tokio::test]
    async fn matching_event_is_kept() {
        let dest = MemoryCalendar::new("dest").with_events([managed("d1", "A", 10)]);
        let report = synchronize(vec![local("A", 10)], &dest, SyncOptions::new())
            .await
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(report.kept, 1);
        assert_eq!(dest.calls(), vec!["list"]);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dest = MemoryCalendar::new("dest");
        let locals = vec![local("A", 10), local("B", 11), local("B", 11)];

        let first = synchronize(locals.clone(), &dest, SyncOptions::new()).await.unwrap();
        assert_eq!(first.created.len(), 3);

        let second = synchronize(locals, &dest, SyncOptions::new()).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.kept, 3);
        assert_eq!(second.skipped_duplicates, 0);
        assert_eq!(dest.events().len(), 3);
    }

    #[tokio::test]
    async fn foreign_events_are_never_deleted() {
        let dest = MemoryCalendar::new("dest").with_events([
            foreign("f1", "Lunch", 10),
            foreign("f2", "A", 10).with_managed_by("some-other-tool"),
        ]);
        let report = synchronize(vec![local("Different", 10)], &dest, SyncOptions::new())
            .await
            .unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped_foreign, 2);
        assert_eq!(report.created.len(), 1);
        assert!(dest.deleted().is_empty());
    }

    #[tokio::test]
    async fn stale_managed_event_is_deleted() {
        let dest = MemoryCalendar::new("dest").with_events([managed("stale", "Old", 10)]);
        let report = synchronize(vec![local("New", 10)], &dest, SyncOptions::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["stale"]);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].event.title, "New");
        assert_eq!(dest.calls(), vec!["list", "delete:stale", "create:New"]);
    }

    #[tokio::test]
    async fn stale_event_with_nothing_to_replace_it() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("keep", "A", 10), managed("stale", "Gone", 11)]);
        let report = synchronize(
            vec![local("A", 10)],
            &dest,
            SyncOptions::new().with_window(TimeWindow::new(at(0), at(23))),
        )
        .await
        .unwrap();

        assert_eq!(report.deleted, vec!["stale"]);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn identical_local_events_are_created_twice() {
        let dest = MemoryCalendar::new("dest");
        let report = synchronize(vec![local("A", 10), local("A", 10)], &dest, SyncOptions::new())
            .await
            .unwrap();

        assert_eq!(report.created.len(), 2);
        assert_ne!(report.created[0].id, report.created[1].id);
    }

    #[tokio::test]
    async fn destination_duplicates_are_skipped_not_deleted() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("d1", "A", 10), managed("d2", "A", 10)]);
        let report = synchronize(vec![local("A", 10)], &dest, SyncOptions::new())
            .await
            .unwrap();

        assert_eq!(report.kept, 1);
        assert_eq!(report.skipped_duplicates, 1);
        assert!(report.is_noop());
        assert_eq!(dest.events().len(), 2);
    }

    #[tokio::test]
    async fn offsets_do_not_affect_matching() {
        let offset = FixedOffset::west_opt(7 * 3600).unwrap();
        let start = at(10).with_timezone(&offset);
        let from_source = Event::new("A", start, start + Duration::minutes(30));

        let dest = MemoryCalendar::new("dest").with_events([managed("d1", "A", 10)]);
        let report = synchronize(vec![from_source], &dest, SyncOptions::new())
            .await
            .unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn notes_participate_in_matching() {
        let dest = MemoryCalendar::new("dest").with_events([managed("d1", "A", 10)]);
        let report = synchronize(
            vec![local("A", 10).with_notes("agenda")],
            &dest,
            SyncOptions::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.deleted, vec!["d1"]);
        assert_eq!(report.created[0].event.notes.as_deref(), Some("agenda"));
    }

    #[tokio::test]
    async fn empty_local_set_fails_fast() {
        let dest = MemoryCalendar::new("dest").with_events([managed("d1", "A", 10)]);
        let err = synchronize(Vec::new(), &dest, SyncOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NoLocalEvents));
        assert!(dest.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_local_set_with_window_clears_managed_events() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("d1", "A", 10), foreign("f1", "B", 11)]);
        let report = synchronize(
            Vec::new(),
            &dest,
            SyncOptions::new().with_window(TimeWindow::new(at(0), at(23))),
        )
        .await
        .unwrap();

        assert_eq!(report.deleted, vec!["d1"]);
        assert_eq!(report.skipped_foreign, 1);
    }

    #[tokio::test]
    async fn derived_window_covers_the_local_events() {
        let dest = MemoryCalendar::new("dest").with_events([managed("outside", "Z", 20)]);
        let report = synchronize(vec![local("A", 10), local("B", 12)], &dest, SyncOptions::new())
            .await
            .unwrap();

        assert_eq!(report.window.start, at(10));
        assert_eq!(report.window.end, at(12) + Duration::minutes(30) + Duration::seconds(1));
        assert!(report.deleted.is_empty());
    }

    #[tokio::test]
    async fn list_failure_writes_nothing() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("stale", "Old", 10)])
            .fail_list(ProviderError::network("unreachable"));
        let err = synchronize(vec![local("A", 10)], &dest, SyncOptions::new())
            .await
            .unwrap_err();

        match &err {
            SyncError::List { destination, source } => {
                assert_eq!(destination, "dest");
                assert_eq!(source.code(), ProviderErrorCode::NetworkError);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dest.calls(), vec!["list"]);
    }

    #[tokio::test]
    async fn create_failure_aborts_remaining_creates() {
        let dest = MemoryCalendar::new("dest").fail_create_on(1, ProviderError::server("boom"));
        let err = synchronize(
            vec![local("A", 10), local("B", 11), local("C", 12)],
            &dest,
            SyncOptions::new(),
        )
        .await
        .unwrap_err();

        match &err {
            SyncError::Create { title, start, .. } => {
                assert_eq!(title, "B");
                assert_eq!(*start, at(11));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dest.calls(), vec!["list", "create:A", "create:B"]);
        assert_eq!(dest.created().len(), 1);
    }

    #[tokio::test]
    async fn delete_failure_aborts_before_creating() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("s1", "Old", 10), managed("s2", "Older", 11)])
            .fail_delete_of("s1", ProviderError::authorization("read-only"));
        let err = synchronize(vec![local("A", 10)], &dest, SyncOptions::new().with_window(TimeWindow::new(at(0), at(23))))
            .await
            .unwrap_err();

        match &err {
            SyncError::Delete { id, title, .. } => {
                assert_eq!(id, "s1");
                assert_eq!(title, "Old");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dest.calls(), vec!["list", "delete:s1"]);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_call() {
        let dest = MemoryCalendar::new("dest");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = synchronize(
            vec![local("A", 10)],
            &dest,
            SyncOptions::new().with_cancel(cancel),
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(dest.calls().is_empty());
    }

    /// Cancels the token during its first create.
    struct CancelOnCreate {
        inner: MemoryCalendar,
        cancel: CancellationToken,
    }

    impl EventDestination for CancelOnCreate {
        fn name(&self) -> &str {
            EventDestination::name(&self.inner)
        }

        fn list_events(
            &self,
            window: TimeWindow,
        ) -> BoxFuture<'_, ProviderResult<Vec<DestinationEvent>>> {
            self.inner.list_events(window)
        }

        fn create_event<'a>(
            &'a self,
            event: &'a Event,
        ) -> BoxFuture<'a, ProviderResult<DestinationEvent>> {
            self.cancel.cancel();
            self.inner.create_event(event)
        }

        fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
            self.inner.delete_event(id)
        }
    }

    #[tokio::test]
    async fn cancellation_mid_run_stops_further_writes() {
        let cancel = CancellationToken::new();
        let dest = CancelOnCreate {
            inner: MemoryCalendar::new("dest"),
            cancel: cancel.clone(),
        };

        let err = synchronize(
            vec![local("A", 10), local("B", 11)],
            &dest,
            SyncOptions::new().with_cancel(cancel),
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(dest.inner.calls(), vec!["list", "create:A"]);
    }

    /// Never answers a list request.
    struct Hanging;

    impl EventDestination for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        fn list_events(
            &self,
            _window: TimeWindow,
        ) -> BoxFuture<'_, ProviderResult<Vec<DestinationEvent>>> {
            Box::pin(std::future::pending())
        }

        fn create_event<'a>(
            &'a self,
            _event: &'a Event,
        ) -> BoxFuture<'a, ProviderResult<DestinationEvent>> {
            Box::pin(std::future::pending())
        }

        fn delete_event<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = synchronize(
            vec![local("A", 10)],
            &Hanging,
            SyncOptions::new().with_cancel(cancel),
        )
        .await
        .unwrap_err();

        assert_eq!(err.destination(), Some("hanging"));
        assert!(err.is_cancelled());
    }
}

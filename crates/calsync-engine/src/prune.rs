//! Prune-only mode: remove every managed event in a window.

use calsync_core::TimeWindow;
use calsync_providers::EventDestination;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::sync::guarded;

/// Outcome of a successful [`delete_managed`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub destination: String,
    pub window: TimeWindow,
    /// Ids of deleted events, in deletion order.
    pub deleted: Vec<String>,
    pub skipped_foreign: usize,
}

/// Deletes every event this tool created in `destination` within `window`.
///
/// Foreign events are left untouched. Stops at the first failed delete.
pub async fn delete_managed(
    destination: &dyn EventDestination,
    window: TimeWindow,
    cancel: &CancellationToken,
) -> SyncResult<PruneReport> {
    let name = destination.name().to_string();
    info!(destination = %name, window = %window, "deleting managed events");

    let existing = guarded(cancel, &name, || destination.list_events(window))
        .await?
        .map_err(|source| SyncError::List {
            destination: name.clone(),
            source,
        })?;

    let mut report = PruneReport {
        destination: name.clone(),
        window,
        deleted: Vec::new(),
        skipped_foreign: 0,
    };

    for event in &existing {
        if !event.is_managed() {
            debug!(destination = %name, id = %event.id, "skipping foreign event");
            report.skipped_foreign += 1;
            continue;
        }
        debug!(destination = %name, id = %event.id, event = %event.event.label(), "deleting");
        guarded(cancel, &name, || destination.delete_event(&event.id))
            .await?
            .map_err(|source| SyncError::Delete {
                destination: name.clone(),
                id: event.id.clone(),
                title: event.event.title.clone(),
                source,
            })?;
        report.deleted.push(event.id.clone());
    }

    info!(
        destination = %name,
        deleted = report.deleted.len(),
        foreign = report.skipped_foreign,
        "prune complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::{at, foreign, managed};
    use calsync_providers::{MemoryCalendar, ProviderError};

    fn day() -> TimeWindow {
        TimeWindow::new(at(0), at(23))
    }

    #[tokio::test]
    async fn deletes_only_managed_events() {
        let dest = MemoryCalendar::new("dest").with_events([
            managed("m1", "A", 10),
            foreign("f1", "Lunch", 12),
            managed("m2", "B", 14),
        ]);

        let report = delete_managed(&dest, day(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["m1", "m2"]);
        assert_eq!(report.skipped_foreign, 1);
        let remaining: Vec<_> = dest.events().into_iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec!["f1"]);
    }

    #[tokio::test]
    async fn events_outside_window_survive() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("early", "A", 2), managed("late", "B", 20)]);

        let report = delete_managed(&dest, TimeWindow::new(at(0), at(12)), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["early"]);
        assert_eq!(dest.events().len(), 1);
    }

    #[tokio::test]
    async fn delete_failure_stops_the_prune() {
        let dest = MemoryCalendar::new("dest")
            .with_events([managed("m1", "A", 10), managed("m2", "B", 14)])
            .fail_delete_of("m1", ProviderError::server("boom"));

        let err = delete_managed(&dest, day(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Delete { ref id, .. } if id == "m1"));
        assert_eq!(dest.calls(), vec!["list", "delete:m1"]);
    }

    #[tokio::test]
    async fn list_failure_is_reported() {
        let dest = MemoryCalendar::new("dest").fail_list(ProviderError::network("down"));
        let err = delete_managed(&dest, day(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::List { .. }));
    }

    #[tokio::test]
    async fn cancelled_prune_touches_nothing() {
        let dest = MemoryCalendar::new("dest").with_events([managed("m1", "A", 10)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = delete_managed(&dest, day(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(dest.calls().is_empty());
        assert_eq!(dest.events().len(), 1);
    }
}

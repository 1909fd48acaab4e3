//! Orchestration of one calsync invocation.

use std::future::pending;
use std::time::Duration;

use calsync_core::{Event, TimeWindow};
use calsync_engine::{delete_managed, synchronize, SyncOptions};
use calsync_providers::{EventDestination, EventSource};
use chrono::Utc;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cli::{Cli, Mode};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::registry;
use crate::update::UpdateCheck;

const UPGRADE_HINT: &str = "Run 'brew update && brew upgrade shadyabhi/tap/calsync' to update";

/// Loads the configuration and runs the mode selected on the command line.
pub async fn run(cli: &Cli) -> ClientResult<()> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&path).map_err(ClientError::Config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "running calsync"
    );

    let cancel = CancellationToken::new();
    let triggers = spawn_cancel_triggers(&cancel, config.sync.timeout());
    let window = TimeWindow::sync_window(Utc::now(), config.sync.days);

    let result = match cli.mode() {
        Mode::Auth => authenticate(&config).await,
        Mode::DeleteDestination(name) => delete_destination(&config, &name, window, &cancel).await,
        Mode::Sync => {
            let update = UpdateCheck::spawn(env!("CARGO_PKG_VERSION"));
            let result = sync(&config, window, &cancel).await;
            report_update(update);
            result
        }
    };

    triggers.abort();
    result
}

/// Cancels `cancel` on Ctrl-C or once `deadline` has passed.
fn spawn_cancel_triggers(cancel: &CancellationToken, deadline: Option<Duration>) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                pending::<()>().await;
            }
        };
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            () = interrupted => warn!("interrupted, cancelling"),
            () = expired => warn!(timeout = ?deadline, "run deadline reached, cancelling"),
        }
        cancel.cancel();
    })
}

async fn authenticate(config: &Config) -> ClientResult<()> {
    for calendar in registry::google_calendars(config)? {
        let name = calendar.config().name.clone();
        if !calendar.needs_auth() {
            info!(calendar = %name, "replacing the cached authorization");
        }
        info!(calendar = %name, "starting Google authorization, a browser window will open");
        calendar.authenticate().await?;
        info!(calendar = %name, "authorization complete");
    }
    Ok(())
}

async fn delete_destination(
    config: &Config,
    name: &str,
    window: TimeWindow,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let destination = registry::find_destination(config, name)?;
    info!(
        calendar = destination.name(),
        days = config.sync.days,
        "deleting all calsync-managed events"
    );
    let report = delete_managed(destination.as_ref(), window, cancel).await?;
    info!(
        calendar = %report.destination,
        deleted = report.deleted.len(),
        "deleted all calsync-managed events"
    );
    Ok(())
}

async fn sync(config: &Config, window: TimeWindow, cancel: &CancellationToken) -> ClientResult<()> {
    let sources = registry::build_sources(config)?;
    let destinations = registry::build_destinations(config)?;
    info!(
        sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
        targets = ?destinations.iter().map(|d| d.name()).collect::<Vec<_>>(),
        "configured calendars"
    );
    info!(window = %window, "searching for events");

    let events = fetch_sources(&sources, window, cancel).await?;
    if events.is_empty() {
        warn!("source calendars returned no events, leaving targets untouched");
        return Ok(());
    }
    sync_destinations(events, &destinations, window, cancel).await
}

/// Fetches every source in turn and returns the events sorted by start.
///
/// The first failing source aborts the fetch.
pub async fn fetch_sources(
    sources: &[Box<dyn EventSource>],
    window: TimeWindow,
    cancel: &CancellationToken,
) -> ClientResult<Vec<Event>> {
    let mut events = Vec::new();
    for source in sources {
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = source.get_events(window) => result.map_err(|e| ClientError::Source {
                name: source.name().to_string(),
                source: e,
            })?,
        };
        info!(source = source.name(), count = fetched.len(), "fetched events");
        events.extend(fetched);
    }
    events.sort_by(Event::cmp_start);
    Ok(events)
}

/// Synchronizes `events` into every destination concurrently.
///
/// Every destination runs to completion or failure; the first error is
/// returned after all have finished.
pub async fn sync_destinations(
    events: Vec<Event>,
    destinations: &[Box<dyn EventDestination>],
    window: TimeWindow,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let runs = destinations.iter().map(|destination| {
        let options = SyncOptions::new()
            .with_window(window)
            .with_cancel(cancel.clone());
        synchronize(events.clone(), destination.as_ref(), options)
    });

    let mut first_error = None;
    for result in join_all(runs).await {
        match result {
            Ok(report) => info!(
                destination = %report.destination,
                created = report.created.len(),
                deleted = report.deleted.len(),
                kept = report.kept,
                foreign = report.skipped_foreign,
                duplicates = report.skipped_duplicates,
                "synchronized"
            ),
            Err(e) => {
                error!(destination = e.destination().unwrap_or_default(), error = %e, "sync failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn report_update(update: UpdateCheck) {
    match update.finish() {
        Some(info) => warn!(
            current = env!("CARGO_PKG_VERSION"),
            latest = %info.latest,
            action = UPGRADE_HINT,
            "a newer version is available"
        ),
        None => debug!("no update information"),
    }
}

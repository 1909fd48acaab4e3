//! macOS Calendar source backed by the `icalBuddy` command line tool.

mod parse;

use std::path::PathBuf;

use calsync_core::{Event, TimeWindow};
use chrono::Local;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, EventSource};

pub use parse::{parse_event, parse_output};

/// Binary looked up on `PATH` when none is configured.
pub const DEFAULT_BINARY: &str = "icalBuddy";

/// Date format icalBuddy accepts for `eventsFrom:`/`to:`.
const RANGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// One macOS calendar read through icalBuddy.
#[derive(Debug, Clone)]
pub struct IcalBuddyCalendar {
    name: String,
    calendar: String,
    binary: PathBuf,
}

impl IcalBuddyCalendar {
    /// `calendar` is the calendar's title in Calendar.app.
    pub fn new(name: impl Into<String>, calendar: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calendar: calendar.into(),
            binary: PathBuf::from(DEFAULT_BINARY),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Arguments for one query, window bounds rendered in local time.
    fn args(&self, window: TimeWindow) -> Vec<String> {
        let from = window.start.with_timezone(&Local).format(RANGE_FORMAT);
        let to = window.end.with_timezone(&Local).format(RANGE_FORMAT);
        vec![
            "-b".to_string(),
            parse::BULLET.to_string(),
            "-eep".to_string(),
            "attendees,location".to_string(),
            "-uid".to_string(),
            "-ic".to_string(),
            self.calendar.clone(),
            "-nc".to_string(),
            "-nrd".to_string(),
            "-tf".to_string(),
            "%H:%M %z".to_string(),
            format!("eventsFrom:{from}"),
            format!("to:{to}"),
        ]
    }

    async fn run(&self, window: TimeWindow) -> ProviderResult<String> {
        let args = self.args(window);
        debug!(binary = %self.binary.display(), ?args, "running icalBuddy");

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProviderError::subprocess(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
                .with_source(e)
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::subprocess(format!(
                "icalBuddy exited with {}, output: {}{}",
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }
        Ok(stdout.into_owned())
    }
}

impl EventSource for IcalBuddyCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        Box::pin(async move {
            let output = self.run(window).await.map_err(|e| e.with_provider(&self.name))?;
            let events: Vec<Event> = parse_output(&output)
                .map_err(|e| e.with_provider(&self.name))?
                .into_iter()
                .filter(|e| window.overlaps_event(e))
                .collect();
            info!(calendar = %self.name, count = events.len(), "fetched icalBuddy events");
            Ok(events)
        })
    }
}

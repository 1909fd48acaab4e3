//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// calsync - Synchronize calendar events between calendars
///
/// Reads events from the enabled source calendars (macOS Calendar through
/// icalBuddy, ICS feeds, Google Calendar) and mirrors them into the enabled
/// target calendars.
#[derive(Debug, Parser)]
#[command(name = "calsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output (also enabled by a non-empty DEBUG variable)
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Delete every calsync-managed event from the named calendar (e.g. "google")
    #[arg(long, value_name = "CALENDAR")]
    pub delete_dst: Option<String>,

    /// Run the Google authorization flow for every enabled Google calendar
    #[arg(long, conflicts_with = "delete_dst")]
    pub auth: bool,
}

impl Cli {
    /// True when `--debug` was given or `DEBUG` is set to a non-empty value.
    pub fn debug_enabled(&self) -> bool {
        self.debug || std::env::var_os("DEBUG").is_some_and(|v| !v.is_empty())
    }

    /// What this invocation should do.
    pub fn mode(&self) -> Mode {
        if self.auth {
            Mode::Auth
        } else if let Some(ref name) = self.delete_dst {
            Mode::DeleteDestination(name.clone())
        } else {
            Mode::Sync
        }
    }
}

/// The operation selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Full synchronization of every enabled source into every enabled target.
    Sync,
    /// Remove managed events from one calendar.
    DeleteDestination(String),
    /// Authorize Google calendars and exit.
    Auth,
}

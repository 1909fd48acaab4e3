//! Builds calendar backends from configuration.
//!
//! Each `[source.*]` / `[target.*]` slot is listed explicitly with its kind
//! name, enabled flag and settings, then turned into an [`EventSource`] or
//! [`EventDestination`]. Backends are named `<role>.<kind>`, e.g.
//! `target.google`.

use std::path::PathBuf;

use calsync_providers::google::GoogleCalendar;
use calsync_providers::icalbuddy::IcalBuddyCalendar;
use calsync_providers::ics::IcsCalendar;
use calsync_providers::{EventDestination, EventSource};
use tracing::debug;

use crate::config::{expand_tilde, Calendars, Config, GoogleSettings, IcalSettings, MacSettings};
use crate::error::{ClientError, ClientResult};

/// Which side of a sync a calendar sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Target => "target",
        }
    }
}

/// Settings of one configured calendar.
#[derive(Debug, Clone, Copy)]
pub enum CalendarConfig<'a> {
    Mac(&'a MacSettings),
    Ical(&'a IcalSettings),
    Google(&'a GoogleSettings),
}

/// One configured calendar slot.
#[derive(Debug, Clone, Copy)]
pub struct CalendarEntry<'a> {
    /// Kind name as written in the config file (`mac`, `ical`, `google`).
    pub name: &'static str,
    pub enabled: bool,
    pub config: CalendarConfig<'a>,
}

impl CalendarEntry<'_> {
    /// Backend name for this slot in `role`.
    pub fn instance_name(&self, role: Role) -> String {
        format!("{}.{}", role.as_str(), self.name)
    }
}

impl Calendars {
    /// Every configured slot, in a fixed order.
    pub fn entries(&self) -> Vec<CalendarEntry<'_>> {
        let mut entries = Vec::new();
        if let Some(ref mac) = self.mac {
            entries.push(CalendarEntry {
                name: "mac",
                enabled: mac.enabled,
                config: CalendarConfig::Mac(mac),
            });
        }
        if let Some(ref ical) = self.ical {
            entries.push(CalendarEntry {
                name: "ical",
                enabled: ical.enabled,
                config: CalendarConfig::Ical(ical),
            });
        }
        if let Some(ref google) = self.google {
            entries.push(CalendarEntry {
                name: "google",
                enabled: google.enabled,
                config: CalendarConfig::Google(google),
            });
        }
        entries
    }

    /// Enabled slots only.
    pub fn enabled(&self) -> impl Iterator<Item = CalendarEntry<'_>> {
        self.entries().into_iter().filter(|entry| entry.enabled)
    }
}

impl Config {
    fn calendars(&self, role: Role) -> &Calendars {
        match role {
            Role::Source => &self.source,
            Role::Target => &self.target,
        }
    }
}

/// Builds every enabled source calendar.
pub fn build_sources(config: &Config) -> ClientResult<Vec<Box<dyn EventSource>>> {
    let mut sources = Vec::new();
    for entry in config.source.enabled() {
        sources.push(build_source(&entry)?);
    }
    if sources.is_empty() {
        return Err(ClientError::NoEnabled { kind: "source" });
    }
    Ok(sources)
}

/// Builds every enabled target calendar.
pub fn build_destinations(config: &Config) -> ClientResult<Vec<Box<dyn EventDestination>>> {
    let mut destinations = Vec::new();
    for entry in config.target.enabled() {
        destinations.push(build_destination(&entry, Role::Target)?);
    }
    if destinations.is_empty() {
        return Err(ClientError::NoEnabled { kind: "target" });
    }
    Ok(destinations)
}

/// Finds an enabled calendar by kind name, case-insensitively, checking
/// targets before sources, and opens it for writing.
pub fn find_destination(config: &Config, name: &str) -> ClientResult<Box<dyn EventDestination>> {
    let wanted = name.trim().to_lowercase();
    for role in [Role::Target, Role::Source] {
        if let Some(entry) = config
            .calendars(role)
            .enabled()
            .find(|entry| entry.name == wanted)
        {
            return build_destination(&entry, role);
        }
    }
    Err(ClientError::UnknownCalendar {
        name: name.to_string(),
    })
}

/// Builds every enabled Google calendar, sources and targets, keeping one
/// calendar per token file.
pub fn google_calendars(config: &Config) -> ClientResult<Vec<GoogleCalendar>> {
    let mut seen_tokens: Vec<PathBuf> = Vec::new();
    let mut calendars = Vec::new();
    for role in [Role::Source, Role::Target] {
        for entry in config.calendars(role).enabled() {
            let CalendarConfig::Google(settings) = entry.config else {
                continue;
            };
            let token = settings.token_path();
            if seen_tokens.contains(&token) {
                debug!(calendar = %entry.instance_name(role), token = %token.display(), "token already covered");
                continue;
            }
            seen_tokens.push(token);
            calendars.push(build_google(settings, &entry.instance_name(role))?);
        }
    }
    if calendars.is_empty() {
        return Err(ClientError::NoEnabled { kind: "Google" });
    }
    Ok(calendars)
}

fn build_source(entry: &CalendarEntry<'_>) -> ClientResult<Box<dyn EventSource>> {
    let name = entry.instance_name(Role::Source);
    debug!(calendar = %name, "initializing source calendar");
    let source: Box<dyn EventSource> = match entry.config {
        CalendarConfig::Mac(settings) => Box::new(build_mac(settings, &name)?),
        CalendarConfig::Ical(settings) => Box::new(IcsCalendar::new(&name, &settings.url)?),
        CalendarConfig::Google(settings) => Box::new(build_google(settings, &name)?),
    };
    Ok(source)
}

fn build_destination(
    entry: &CalendarEntry<'_>,
    role: Role,
) -> ClientResult<Box<dyn EventDestination>> {
    let name = entry.instance_name(role);
    debug!(calendar = %name, "initializing destination calendar");
    match entry.config {
        CalendarConfig::Google(settings) => Ok(Box::new(build_google(settings, &name)?)),
        CalendarConfig::Mac(_) | CalendarConfig::Ical(_) => Err(ClientError::Config(format!(
            "{} calendar is read-only and cannot be written to",
            name
        ))),
    }
}

fn build_mac(settings: &MacSettings, name: &str) -> ClientResult<IcalBuddyCalendar> {
    if settings.name.trim().is_empty() {
        return Err(ClientError::Config(format!(
            "{}: calendar name is required",
            name
        )));
    }
    let mut calendar = IcalBuddyCalendar::new(name, &settings.name);
    if let Some(ref binary) = settings.icalbuddy_binary {
        calendar = calendar.with_binary(expand_tilde(binary));
    }
    Ok(calendar)
}

fn build_google(settings: &GoogleSettings, name: &str) -> ClientResult<GoogleCalendar> {
    let config = settings
        .to_provider_config(name)
        .map_err(|e| ClientError::Config(format!("{}: {}", name, e)))?;
    Ok(GoogleCalendar::new(config)?)
}

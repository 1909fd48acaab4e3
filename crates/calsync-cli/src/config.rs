//! Configuration file.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/calsync/config.toml`. Calendars are declared twice over, once
//! under `[source.*]` and once under `[target.*]`:
//!
//! ```toml
//! [sync]
//! days = 7
//!
//! [source.mac]
//! enabled = true
//! name = "Work"
//!
//! [target.google]
//! enabled = true
//! id = "abcd@group.calendar.google.com"
//! ```
//!
//! Google credential values (`client_id`, `client_secret`) support secret
//! references (`pass::…`, `env::…`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_providers::google::{GoogleConfig, OAuthCredentials};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncSettings,
    /// Calendars events are read from.
    pub source: Calendars,
    /// Calendars events are written into.
    pub target: Calendars,
}

/// Sync window and run limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Window length in days, starting at UTC midnight of yesterday.
    pub days: u32,

    /// Deadline for the whole run in seconds; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            days: 7,
            timeout_secs: 300,
        }
    }
}

impl SyncSettings {
    /// The run deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// One slot per supported calendar kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Calendars {
    pub mac: Option<MacSettings>,
    pub ical: Option<IcalSettings>,
    pub google: Option<GoogleSettings>,
}

/// macOS Calendar, read through icalBuddy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MacSettings {
    pub enabled: bool,

    /// icalBuddy executable; looked up on `PATH` when unset.
    pub icalbuddy_binary: Option<PathBuf>,

    /// Calendar name as shown in Calendar.app.
    pub name: String,
}

/// A published ICS feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IcalSettings {
    pub enabled: bool,

    /// Feed URL (`http`, `https` or `webcal`).
    pub url: String,
}

/// Google Calendar settings.
///
/// Credentials come either inline (`client_id` + `client_secret`) or from a
/// Cloud Console JSON file (`credentials`, defaulting to
/// `~/.config/calsync/credentials.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub enabled: bool,

    /// Calendar id, e.g. `primary` or `abcd@group.calendar.google.com`.
    pub id: String,

    /// Path to the OAuth client credentials JSON file.
    pub credentials: Option<PathBuf>,

    /// Path to the cached token.
    pub token: Option<PathBuf>,

    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            id: "primary".to_string(),
            credentials: None,
            token: None,
            client_id: None,
            client_secret: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err(format!("config file not found: {}", path.display()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        let config = Self::parse(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks settings that do not depend on any calendar backend.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync.days == 0 {
            return Err("sync.days must be at least 1".to_string());
        }
        Ok(())
    }

    /// `~/.config/calsync/config.toml`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// `~/.config/calsync`.
    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".config"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
    }
}

impl GoogleSettings {
    /// Converts to provider configuration for the calendar registered as
    /// `name`.
    pub fn to_provider_config(&self, name: &str) -> Result<GoogleConfig, String> {
        let credentials = self.resolve_credentials()?;
        credentials
            .validate()
            .map_err(|e| format!("invalid Google credentials for {}: {}", name, e))?;

        let mut config = GoogleConfig::new(credentials)
            .with_name(name)
            .with_calendar_id(&self.id);
        if let Some(ref token) = self.token {
            config = config.with_token_path(expand_tilde(token));
        }
        Ok(config)
    }

    /// Token path this calendar will use.
    pub fn token_path(&self) -> PathBuf {
        self.token
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(GoogleConfig::default_token_path)
    }

    /// Resolves OAuth credentials from the inline fields or the credentials
    /// file.
    pub(crate) fn resolve_credentials(&self) -> Result<OAuthCredentials, String> {
        if self.client_id.is_some() || self.client_secret.is_some() {
            let raw_id = self
                .client_id
                .as_deref()
                .ok_or("client_secret is set but client_id is missing")?;
            let raw_secret = self
                .client_secret
                .as_deref()
                .ok_or("client_id is set but client_secret is missing")?;

            let client_id = crate::secret::resolve(raw_id)
                .map_err(|e| format!("failed to resolve client_id: {}", e))?;
            let client_secret = crate::secret::resolve(raw_secret)
                .map_err(|e| format!("failed to resolve client_secret: {}", e))?;
            return Ok(OAuthCredentials::new(client_id, client_secret));
        }

        let path = self
            .credentials
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(GoogleConfig::default_credentials_path);
        OAuthCredentials::from_file(&path).map_err(|e| {
            format!(
                "Google credentials not found: {}\n  \
                 Download an OAuth client JSON to {} or set client_id and client_secret",
                e,
                path.display()
            )
        })
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

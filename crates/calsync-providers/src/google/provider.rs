//! Google Calendar as an event source and destination.

use calsync_core::{DestinationEvent, Event, TimeWindow};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, EventDestination, EventSource};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::OAuthClient;
use super::tokens::TokenStorage;

/// A single Google calendar, addressed by id.
///
/// Tokens are loaded from the configured token file; an expired access token
/// is refreshed transparently before the next API call.
pub struct GoogleCalendar {
    config: GoogleConfig,
    token_storage: TokenStorage,
    oauth_client: OAuthClient,
    api_client: RwLock<Option<GoogleCalendarClient>>,
}

impl GoogleCalendar {
    /// Creates the calendar and loads cached tokens, without any network
    /// traffic.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::configuration(e).with_provider(&config.name))?;

        let token_storage = TokenStorage::new(&config.token_path);
        token_storage.load()?;

        let oauth_client = OAuthClient::new(config.credentials.clone(), config.timeout)?;

        Ok(Self {
            config,
            token_storage,
            oauth_client,
            api_client: RwLock::new(None),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// True when no usable token is cached and [`authenticate`](Self::authenticate)
    /// must run before any API call.
    pub fn needs_auth(&self) -> bool {
        self.token_storage.needs_reauth(&self.config.scopes)
    }

    /// Runs the browser consent flow and caches the resulting tokens.
    pub async fn authenticate(&self) -> ProviderResult<()> {
        info!(calendar = %self.config.name, "authenticating with Google");

        let tokens = self
            .oauth_client
            .authorize(&self.config.scopes, self.config.loopback_port_range)
            .await
            .map_err(|e| e.with_provider(&self.config.name))?;
        self.token_storage.set(tokens)?;
        *self.api_client.write().await = None;

        info!(path = %self.token_storage.path().display(), "Google authentication complete");
        Ok(())
    }

    /// Ensures an API client holding a fresh access token exists.
    async fn ensure_client(&self) -> ProviderResult<()> {
        let tokens = self.token_storage.get().ok_or_else(|| {
            ProviderError::authentication("not authenticated, run `calsync --auth`")
                .with_provider(&self.config.name)
        })?;

        if !tokens.is_expired() {
            let mut client = self.api_client.write().await;
            if client.is_none() {
                *client = Some(GoogleCalendarClient::new(
                    &tokens.access_token,
                    self.config.timeout,
                )?);
            }
            return Ok(());
        }

        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            ProviderError::authentication("access token expired and no refresh token is cached")
                .with_provider(&self.config.name)
        })?;

        debug!(calendar = %self.config.name, "refreshing expired access token");
        let (access_token, expires_in) = self
            .oauth_client
            .refresh_token(refresh_token)
            .await
            .map_err(|e| e.with_provider(&self.config.name))?;
        self.token_storage
            .update_access_token(&access_token, expires_in)?;

        let mut client = self.api_client.write().await;
        match client.as_mut() {
            Some(c) => c.set_access_token(access_token),
            None => {
                *client = Some(GoogleCalendarClient::new(access_token, self.config.timeout)?);
            }
        }
        Ok(())
    }

    async fn list(&self, window: TimeWindow) -> ProviderResult<Vec<DestinationEvent>> {
        self.ensure_client().await?;
        let guard = self.api_client.read().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| ProviderError::internal("API client missing after authentication"))?;

        match client.list_events(&self.config.calendar_id, window).await {
            Err(e) if e.is_not_found() => Err(self.missing_calendar(client).await),
            other => other.map_err(|e| e.with_provider(&self.config.name)),
        }
    }

    /// Builds the error for an unknown calendar id, naming the ids that do
    /// exist on the account.
    async fn missing_calendar(&self, client: &GoogleCalendarClient) -> ProviderError {
        let available = match client.list_calendars().await {
            Ok(calendars) => calendars
                .iter()
                .map(|c| format!("{} ({})", c.id, c.summary))
                .collect::<Vec<_>>()
                .join(", "),
            Err(e) => {
                warn!(error = %e, "could not list calendars");
                "unknown".to_string()
            }
        };
        ProviderError::configuration(format!(
            "calendar {:?} does not exist on this account; available calendars: {}",
            self.config.calendar_id, available
        ))
        .with_provider(&self.config.name)
    }
}

impl EventSource for GoogleCalendar {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn get_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<Event>>> {
        Box::pin(async move {
            let events = self.list(window).await?;
            Ok(events.into_iter().map(|e| e.event).collect())
        })
    }
}

impl EventDestination for GoogleCalendar {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn list_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<DestinationEvent>>> {
        Box::pin(self.list(window))
    }

    fn create_event<'a>(
        &'a self,
        event: &'a Event,
    ) -> BoxFuture<'a, ProviderResult<DestinationEvent>> {
        Box::pin(async move {
            self.ensure_client().await?;
            let guard = self.api_client.read().await;
            let client = guard.as_ref().ok_or_else(|| {
                ProviderError::internal("API client missing after authentication")
            })?;
            client
                .insert_event(&self.config.calendar_id, event)
                .await
                .map_err(|e| e.with_provider(&self.config.name))
        })
    }

    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.ensure_client().await?;
            let guard = self.api_client.read().await;
            let client = guard.as_ref().ok_or_else(|| {
                ProviderError::internal("API client missing after authentication")
            })?;
            client
                .delete_event(&self.config.calendar_id, id)
                .await
                .map_err(|e| e.with_provider(&self.config.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::OAuthCredentials;
    use crate::google::TokenInfo;
    use chrono::{Duration, Utc};

    fn config(dir: &tempfile::TempDir) -> GoogleConfig {
        GoogleConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "test-secret",
        ))
        .with_name("google")
        .with_token_path(dir.path().join("token.json"))
    }

    fn window() -> TimeWindow {
        TimeWindow::from_duration(Utc::now(), Duration::days(1))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = GoogleCalendar::new(config(&dir).with_calendar_id(""))
            .err()
            .unwrap();
        assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
        assert_eq!(err.provider(), Some("google"));
    }

    #[test]
    fn needs_auth_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let calendar = GoogleCalendar::new(config(&dir)).unwrap();
        assert!(calendar.needs_auth());
    }

    #[test]
    fn cached_token_with_scope_is_usable() {
        let dir = tempfile::tempdir().unwrap();
        TokenStorage::new(dir.path().join("token.json"))
            .set(TokenInfo::new(
                "access",
                Some("refresh".to_string()),
                Some(3600),
                vec![GoogleConfig::DEFAULT_SCOPE.to_string()],
            ))
            .unwrap();

        let calendar = GoogleCalendar::new(config(&dir)).unwrap();
        assert!(!calendar.needs_auth());
    }

    #[tokio::test]
    async fn api_calls_require_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let calendar = GoogleCalendar::new(config(&dir)).unwrap();

        let err = calendar.list_events(window()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("calsync --auth"));

        let err = calendar.delete_event("some-id").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tokens = TokenInfo::new(
            "access",
            None,
            None,
            vec![GoogleConfig::DEFAULT_SCOPE.to_string()],
        );
        tokens.expires_at = Some(Utc::now() - Duration::hours(1));
        TokenStorage::new(dir.path().join("token.json"))
            .set(tokens)
            .unwrap();

        let calendar = GoogleCalendar::new(config(&dir)).unwrap();
        let err = calendar.get_events(window()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("no refresh token"));
    }
}

//! Google Calendar backend.
//!
//! [`GoogleCalendar`] reads events as an [`EventSource`](crate::EventSource)
//! and writes managed events as an
//! [`EventDestination`](crate::EventDestination) through the Calendar API v3.
//!
//! # Authentication Flow
//!
//! 1. User provides their own OAuth client ID/secret (required by Google)
//! 2. A loopback listener is bound on `127.0.0.1`
//! 3. The browser opens Google's consent page with a PKCE challenge
//! 4. Google redirects to the loopback listener with the authorization code
//! 5. The code is exchanged for access and refresh tokens
//! 6. Tokens are cached in the token file and refreshed on expiry
//!
//! # Managed events
//!
//! Created events carry `source.title = "calsync"` and the source uid in
//! `extendedProperties.private.uid`. Only events with that source title are
//! reported as managed.

mod client;
mod config;
mod oauth;
mod provider;
mod tokens;

pub use client::CalendarListEntry;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PkceFlow};
pub use provider::GoogleCalendar;
pub use tokens::{TokenInfo, TokenStorage};

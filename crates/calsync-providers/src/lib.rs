//! Calendar backends for calsync.
//!
//! This crate provides the seams between the sync engine and real calendars:
//!
//! - [`EventSource`] - read-only origin of events for a sync run
//! - [`EventDestination`] - calendar the engine lists, creates and deletes in
//! - [`ProviderError`] - classified error type shared by every backend
//!
//! # Backends
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │  icalBuddy   │  │   ICS feed   │  │ Google API   │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │                 │                 │
//!        └── EventSource ──┴── EventSource ──┤
//!                                            │
//!                                   EventDestination
//! ```
//!
//! [`MemoryCalendar`] implements both traits in memory and is meant for tests.

pub mod error;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "icalbuddy")]
pub mod icalbuddy;
#[cfg(feature = "ics")]
pub mod ics;
pub mod memory;
pub mod provider;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use memory::MemoryCalendar;
pub use provider::{BoxFuture, ErrorCalendar, EventDestination, EventSource};

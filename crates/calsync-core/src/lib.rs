//! Core types: events, fingerprints, time windows, tracing

pub mod event;
pub mod time;
pub mod tracing;

pub use event::{DestinationEvent, Event, Fingerprint, FINGERPRINT_SCHEME, MANAGED_TAG};
pub use time::TimeWindow;
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};

//! The calsync synchronization engine.
//!
//! [`synchronize`] makes one destination calendar mirror a set of local
//! events inside a time window:
//!
//! - destination events whose [`Fingerprint`](calsync_core::Fingerprint)
//!   matches an unmatched local event are kept untouched
//! - unmatched destination events carrying the managed tag are deleted
//! - unmatched foreign events are never touched
//! - local events left unmatched are created
//!
//! [`delete_managed`] removes every managed event in a window.
//!
//! Both abort on the first destination error and honor a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

mod dedup;
mod error;
mod prune;
mod sync;

pub use dedup::{DuplicateIndex, Observation};
pub use error::{SyncError, SyncResult};
pub use prune::{PruneReport, delete_managed};
pub use sync::{SyncOptions, SyncReport, synchronize};

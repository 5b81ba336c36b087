//! Offline-first sync orchestration.
//!
//! Writes go straight to the backend while online and fall back to the
//! durable queue otherwise. The queue is drained by sync passes triggered by
//! coming back online, by a periodic timer, or explicitly:
//! - at most one pass runs at a time
//! - actions are delivered oldest first, with a short pause between them
//! - a failed delivery is retried on later passes until the retry ceiling,
//!   after which the action stays `FAILED` until retried or discarded
//!
//! Delivery is at-least-once: if a success response is lost the action is
//! sent again, and no idempotency token accompanies it.

mod connectivity;
mod engine;
mod types;

#[cfg(test)]
mod tests;

pub use connectivity::ConnectivityMonitor;
pub use engine::{SyncEngine, CLIENT_TIMESTAMP_KEY, OFFLINE_SYNC_KEY, ORIGINAL_TIMESTAMP_KEY};
pub use types::{RefreshReport, SyncReport, SyncSettings, WriteOutcome};

use std::time::Duration;

use crate::store::SyncCategory;

/// Tuning knobs for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
  /// Periodic sync interval while online
  pub interval: Duration,
  /// Wait after an offline->online transition before syncing
  pub settle_delay: Duration,
  /// Pause between two deliveries within one pass
  pub throttle: Duration,
  /// Failed deliveries before an action becomes terminally `FAILED`
  pub max_retries: u32,
  /// Reachability probe interval
  pub probe_interval: Duration,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(30),
      settle_delay: Duration::from_secs(1),
      throttle: Duration::from_millis(100),
      max_retries: 3,
      probe_interval: Duration::from_secs(10),
    }
  }
}

/// Outcome of a write-path call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
  /// `false` when the backend accepted the mutation directly
  pub queued: bool,
  pub action_id: Option<String>,
}

impl WriteOutcome {
  pub fn delivered() -> Self {
    Self {
      queued: false,
      action_id: None,
    }
  }

  pub fn queued(action_id: String) -> Self {
    Self {
      queued: true,
      action_id: Some(action_id),
    }
  }
}

/// A delivery attempt that failed during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
  pub action_id: String,
  pub error: String,
}

/// Summary of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub success: usize,
  /// Failed delivery attempts, retryable or terminal
  pub failed: usize,
  /// Queue size once the pass finished
  pub pending: usize,
  pub errors: Vec<ActionError>,
}

impl SyncReport {
  pub fn attempts(&self) -> usize {
    self.success + self.failed
  }
}

/// Summary of one cache refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
  /// Set when the refresh did not run because the device is offline
  pub skipped: bool,
  pub refreshed: Vec<SyncCategory>,
  pub failed: Vec<(SyncCategory, String)>,
}

impl RefreshReport {
  pub fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }

  pub fn is_complete(&self) -> bool {
    !self.skipped && self.failed.is_empty()
  }
}

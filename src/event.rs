use tokio::sync::mpsc;

use crate::sync::SyncReport;

/// Notifications emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
  /// A sync pass began
  SyncStarted,
  /// A sync pass finished
  SyncCompleted(SyncReport),
  /// An action was delivered and removed from the queue
  ActionSynced { action_id: String },
  /// A delivery attempt failed; `terminal` once retries are exhausted
  ActionFailed {
    action_id: String,
    error: String,
    terminal: bool,
  },
  /// Reachability changed
  OnlineStatusChanged(bool),
}

pub type EventSender = mpsc::UnboundedSender<SyncEvent>;

/// Receiving end of the engine's event stream
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl EventHandler {
  /// Create a connected sender/handler pair
  pub fn channel() -> (EventSender, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { rx })
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<SyncEvent> {
    self.rx.recv().await
  }

  /// Take an already queued event without waiting
  pub fn try_next(&mut self) -> Option<SyncEvent> {
    self.rx.try_recv().ok()
  }
}

//! Reachability polling that drives the engine's online/offline transitions.

use tokio::task::JoinHandle;
use tracing::debug;

use crate::remote::Backend;
use crate::store::LocalStore;

use super::engine::SyncEngine;

/// Background task pinging the backend on `SyncSettings::probe_interval`.
/// Stops when dropped.
pub struct ConnectivityMonitor {
  handle: JoinHandle<()>,
}

impl ConnectivityMonitor {
  pub fn spawn<S: LocalStore + 'static, B: Backend>(engine: SyncEngine<S, B>) -> Self {
    let interval = engine.settings().probe_interval;
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let online = engine.probe().await;
        debug!(online, "Connectivity probe");
      }
    });

    Self { handle }
  }

  pub fn stop(&self) {
    self.handle.abort();
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

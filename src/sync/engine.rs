//! Sync orchestrator: online-first writes, durable queue draining and cache
//! refresh.

use chrono::{DateTime, Datelike, Duration as DateDuration, Local, Months, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{EventHandler, EventSender, SyncEvent};
use crate::remote::api_types::{self, ApiAttendance, ApiProfile, ApiSchedule};
use crate::remote::{Backend, Endpoint};
use crate::store::{
  ActionStatus, ActionType, ActionUpdate, Attendance, LocalStore, Payload, PendingAction,
  Schedule, SyncCategory, UserProfile,
};

use super::types::{ActionError, RefreshReport, SyncReport, SyncSettings, WriteOutcome};

/// Payload key stamped on every queued action at enqueue time.
pub const CLIENT_TIMESTAMP_KEY: &str = "client_timestamp";
/// Replay annotation marking a delivery as coming from the offline queue.
pub const OFFLINE_SYNC_KEY: &str = "is_offline_sync";
/// Replay annotation carrying the action's queue timestamp.
pub const ORIGINAL_TIMESTAMP_KEY: &str = "original_timestamp";

/// Handle to the sync engine. Clones share the same state.
pub struct SyncEngine<S, B> {
  inner: Arc<EngineInner<S, B>>,
}

struct EngineInner<S, B> {
  store: S,
  backend: B,
  settings: SyncSettings,
  online: AtomicBool,
  /// Held for the whole of a sync pass
  syncing: AtomicBool,
  refresh_lock: tokio::sync::Mutex<()>,
  events: Mutex<Option<EventSender>>,
  timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S, B> Drop for EngineInner<S, B> {
  fn drop(&mut self) {
    if let Ok(mut timer) = self.timer.lock() {
      if let Some(handle) = timer.take() {
        handle.abort();
      }
    }
  }
}

impl<S, B> Clone for SyncEngine<S, B> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

/// Marks a sync pass as running until dropped.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for PassGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

impl<S: LocalStore + 'static, B: Backend> SyncEngine<S, B> {
  /// Create an engine. It starts out offline and without a periodic timer.
  pub fn new(store: S, backend: B, settings: SyncSettings) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        store,
        backend,
        settings,
        online: AtomicBool::new(false),
        syncing: AtomicBool::new(false),
        refresh_lock: tokio::sync::Mutex::new(()),
        events: Mutex::new(None),
        timer: Mutex::new(None),
      }),
    }
  }

  /// Set the initial reachability without firing a transition.
  pub fn with_online(self, online: bool) -> Self {
    self.inner.online.store(online, Ordering::SeqCst);
    self
  }

  /// Route engine events to a new handler, replacing any previous one.
  pub fn subscribe(&self) -> EventHandler {
    let (tx, handler) = EventHandler::channel();
    if let Ok(mut events) = self.inner.events.lock() {
      *events = Some(tx);
    }
    handler
  }

  pub fn store(&self) -> &S {
    &self.inner.store
  }

  pub fn settings(&self) -> &SyncSettings {
    &self.inner.settings
  }

  pub fn is_online(&self) -> bool {
    self.inner.online.load(Ordering::SeqCst)
  }

  pub fn is_syncing(&self) -> bool {
    self.inner.syncing.load(Ordering::SeqCst)
  }

  fn emit(&self, event: SyncEvent) {
    if let Ok(events) = self.inner.events.lock() {
      if let Some(tx) = events.as_ref() {
        // Ignore send errors - the handler may have been dropped
        let _ = tx.send(event);
      }
    }
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  /// Open the store, recover interrupted deliveries and start the periodic
  /// sync timer. Calling it again restarts the timer.
  pub fn start(&self) -> Result<()> {
    self.inner.store.init()?;

    let recovered = self.recover_interrupted()?;
    if recovered > 0 {
      info!(recovered, "Recovered actions interrupted mid-delivery");
    }

    let weak: Weak<EngineInner<S, B>> = Arc::downgrade(&self.inner);
    let interval = self.inner.settings.interval;
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // First tick completes immediately
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
          break;
        };
        let engine = SyncEngine { inner };
        if engine.is_online() {
          engine.sync().await;
        }
      }
    });

    let mut timer = self
      .inner
      .timer
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if let Some(previous) = timer.replace(handle) {
      previous.abort();
    }
    debug!(interval_secs = interval.as_secs(), "Periodic sync started");
    Ok(())
  }

  /// Stop the periodic timer. A pass already running is left to finish.
  pub fn shutdown(&self) {
    if let Ok(mut timer) = self.inner.timer.lock() {
      if let Some(handle) = timer.take() {
        handle.abort();
        debug!("Periodic sync stopped");
      }
    }
  }

  /// Record reachability. Going online schedules a sync pass followed by a
  /// cache refresh once the settle delay has passed.
  pub fn set_online(&self, online: bool) {
    let was_online = self.inner.online.swap(online, Ordering::SeqCst);
    if was_online == online {
      return;
    }

    info!(online, "Network status changed");
    self.emit(SyncEvent::OnlineStatusChanged(online));

    if online {
      let engine = self.clone();
      tokio::spawn(async move {
        tokio::time::sleep(engine.inner.settings.settle_delay).await;
        engine.sync().await;
        engine.refresh_cache().await;
      });
    }
  }

  /// Ping the backend once and record the result as the current
  /// reachability.
  pub async fn probe(&self) -> bool {
    let online = match self.inner.backend.ping().await {
      Ok(()) => true,
      Err(e) => {
        debug!("Backend unreachable: {}", e);
        false
      }
    };
    self.set_online(online);
    online
  }

  // ==========================================================================
  // Write path
  // ==========================================================================

  /// Deliver a mutation now if online, otherwise (or on any failure) queue it.
  ///
  /// Network errors are never returned; only a failure to queue locally is.
  pub async fn submit(&self, action_type: ActionType, payload: Payload) -> Result<WriteOutcome> {
    if self.is_online() {
      let endpoint = Endpoint::for_action(action_type);
      match self
        .inner
        .backend
        .post(&endpoint, Value::Object(payload.clone()))
        .await
      {
        Ok(_) => {
          debug!(action_type = %action_type, "Delivered directly");
          return Ok(WriteOutcome::delivered());
        }
        Err(e) => {
          warn!(action_type = %action_type, "Direct delivery failed, queueing: {}", e);
        }
      }
    }

    let mut payload = payload;
    payload.insert(
      CLIENT_TIMESTAMP_KEY.to_string(),
      Value::String(Utc::now().to_rfc3339()),
    );

    self.inner.store.init()?;
    let action = self.inner.store.add_pending_action(action_type, payload)?;
    info!(action_id = %action.id, action_type = %action_type, "Queued for later delivery");

    Ok(WriteOutcome::queued(action.id))
  }

  pub async fn record_check_in(&self, payload: Payload) -> Result<WriteOutcome> {
    self.submit(ActionType::CheckIn, payload).await
  }

  pub async fn record_check_out(&self, payload: Payload) -> Result<WriteOutcome> {
    self.submit(ActionType::CheckOut, payload).await
  }

  pub async fn submit_leave_request(&self, payload: Payload) -> Result<WriteOutcome> {
    self.submit(ActionType::LeaveRequest, payload).await
  }

  pub async fn submit_schedule_change(&self, payload: Payload) -> Result<WriteOutcome> {
    self.submit(ActionType::ScheduleChange, payload).await
  }

  // ==========================================================================
  // Sync pass
  // ==========================================================================

  /// Drain the queue once, oldest action first.
  ///
  /// Refused (no deliveries, current queue size reported) while offline or
  /// while another pass is running.
  pub async fn sync(&self) -> SyncReport {
    if !self.is_online() {
      debug!("Sync skipped, offline");
      return self.idle_report();
    }

    let Some(_pass) = PassGuard::acquire(&self.inner.syncing) else {
      debug!("Sync skipped, a pass is already running");
      return self.idle_report();
    };

    self.emit(SyncEvent::SyncStarted);

    let mut report = SyncReport::default();
    match self.inner.store.get_pending_actions() {
      Ok(actions) => self.drain(actions, &mut report).await,
      Err(e) => error!("Failed to load pending actions: {}", e),
    }
    report.pending = self.queue_size();

    if report.attempts() > 0 {
      info!(
        success = report.success,
        failed = report.failed,
        pending = report.pending,
        "Sync pass finished"
      );
    }
    self.emit(SyncEvent::SyncCompleted(report.clone()));
    report
  }

  async fn drain(&self, actions: Vec<PendingAction>, report: &mut SyncReport) {
    let throttle = self.inner.settings.throttle;
    let mut attempted_any = false;

    for action in actions {
      if self.is_exhausted(&action) {
        continue;
      }

      if attempted_any && !throttle.is_zero() {
        tokio::time::sleep(throttle).await;
      }

      if self.deliver(&action.id, report).await {
        attempted_any = true;
      }
    }
  }

  /// Deliver one queued action. Returns `false` when it was skipped because
  /// it left the queue after the pass loaded it.
  async fn deliver(&self, action_id: &str, report: &mut SyncReport) -> bool {
    let store = &self.inner.store;

    let action = match store.get_pending_action(action_id) {
      Ok(Some(action)) => action,
      Ok(None) => {
        debug!(action_id, "Skipped, no longer queued");
        return false;
      }
      Err(e) => {
        warn!(action_id, "Failed to reload action, skipping: {}", e);
        return false;
      }
    };
    if self.is_exhausted(&action) {
      return false;
    }

    if let Err(e) = store.update_pending_action(&action.id, ActionUpdate::status(ActionStatus::Syncing)) {
      warn!(action_id = %action.id, "Failed to mark action as syncing: {}", e);
    }

    let endpoint = Endpoint::for_action(action.action_type);
    match self.inner.backend.post(&endpoint, replay_body(&action)).await {
      Ok(_) => {
        // A failed removal means the action will be delivered again.
        if let Err(e) = store.remove_pending_action(&action.id) {
          error!(action_id = %action.id, "Delivered but failed to dequeue: {}", e);
        }
        debug!(action_id = %action.id, action_type = %action.action_type, "Action synced");
        report.success += 1;
        self.emit(SyncEvent::ActionSynced {
          action_id: action.id,
        });
      }
      Err(e) => {
        let error = e.to_string();
        let retry_count = action.retry_count + 1;
        let terminal = retry_count >= self.inner.settings.max_retries;
        let status = if terminal {
          ActionStatus::Failed
        } else {
          ActionStatus::Pending
        };

        let update = ActionUpdate {
          status: Some(status),
          retry_count: Some(retry_count),
          last_error: Some(Some(error.clone())),
        };
        if let Err(e) = store.update_pending_action(&action.id, update) {
          error!(action_id = %action.id, "Failed to record delivery failure: {}", e);
        }

        if terminal {
          warn!(
            action_id = %action.id,
            attempts = retry_count,
            "Giving up on action: {}",
            error
          );
        } else {
          debug!(action_id = %action.id, attempts = retry_count, "Delivery failed: {}", error);
        }

        report.failed += 1;
        report.errors.push(ActionError {
          action_id: action.id.clone(),
          error: error.clone(),
        });
        self.emit(SyncEvent::ActionFailed {
          action_id: action.id,
          error,
          terminal,
        });
      }
    }
    true
  }

  /// Terminally failed actions wait for `retry_failed` or `discard_action`.
  fn is_exhausted(&self, action: &PendingAction) -> bool {
    action.status == ActionStatus::Failed && action.retry_count >= self.inner.settings.max_retries
  }

  fn queue_size(&self) -> usize {
    self
      .inner
      .store
      .get_pending_action_count()
      .unwrap_or_else(|e| {
        warn!("Failed to count pending actions: {}", e);
        0
      })
  }

  fn idle_report(&self) -> SyncReport {
    SyncReport {
      pending: self.queue_size(),
      ..SyncReport::default()
    }
  }

  // ==========================================================================
  // Cache refresh
  // ==========================================================================

  /// Pull profile, this week's schedule and this month's attendance.
  ///
  /// Each category is independent: a failure leaves that collection and its
  /// last-sync time untouched and does not affect the others.
  pub async fn refresh_cache(&self) -> RefreshReport {
    if !self.is_online() {
      debug!("Cache refresh skipped, offline");
      return RefreshReport::skipped();
    }

    let _refresh = self.inner.refresh_lock.lock().await;
    let today = Local::now().date_naive();

    let (profile, schedules, attendances) = tokio::join!(
      self.refresh_profile(),
      self.refresh_schedules(today),
      self.refresh_attendances(today),
    );

    let mut report = RefreshReport::default();
    for (category, outcome) in [
      (SyncCategory::Profile, profile),
      (SyncCategory::Schedules, schedules),
      (SyncCategory::Attendances, attendances),
    ] {
      match outcome {
        Ok(()) => report.refreshed.push(category),
        Err(e) => {
          warn!(category = %category, "Cache refresh failed: {}", e);
          report.failed.push((category, e.to_string()));
        }
      }
    }

    info!(
      refreshed = report.refreshed.len(),
      failed = report.failed.len(),
      "Cache refresh finished"
    );
    report
  }

  async fn refresh_profile(&self) -> Result<()> {
    let body = self.inner.backend.get(&Endpoint::Profile).await?;
    let profile: ApiProfile = api_types::decode(body)?;

    self
      .inner
      .store
      .save_user_profile(&profile.into_cached(Utc::now()))?;
    self
      .inner
      .store
      .set_last_sync_time(SyncCategory::Profile.key())
  }

  async fn refresh_schedules(&self, today: NaiveDate) -> Result<()> {
    let (start, end) = week_bounds(today);
    let body = self
      .inner
      .backend
      .get(&Endpoint::Schedules { start, end })
      .await?;

    let cached_at = Utc::now();
    let schedules: Vec<Schedule> = api_types::decode::<Vec<ApiSchedule>>(body)?
      .into_iter()
      .map(|s| s.into_cached(cached_at))
      .collect();

    self.inner.store.save_schedules(&schedules)?;
    self
      .inner
      .store
      .set_last_sync_time(SyncCategory::Schedules.key())
  }

  async fn refresh_attendances(&self, today: NaiveDate) -> Result<()> {
    let (start, end) = month_bounds(today);
    let body = self
      .inner
      .backend
      .get(&Endpoint::Attendances { start, end })
      .await?;

    let cached_at = Utc::now();
    let attendances: Vec<Attendance> = api_types::decode::<Vec<ApiAttendance>>(body)?
      .into_iter()
      .map(|a| a.into_cached(cached_at))
      .collect();

    self.inner.store.save_attendances(&attendances)?;
    self
      .inner
      .store
      .set_last_sync_time(SyncCategory::Attendances.key())
  }

  // ==========================================================================
  // Cached reads
  // ==========================================================================

  pub fn get_profile(&self) -> Result<Option<UserProfile>> {
    self.inner.store.get_user_profile()
  }

  /// Schedule for the device's local calendar date.
  pub fn get_today_schedule(&self) -> Result<Option<Schedule>> {
    self
      .inner
      .store
      .get_schedule_by_date(Local::now().date_naive())
  }

  /// Schedules from Monday to Sunday of the device's current week.
  pub fn get_week_schedule(&self) -> Result<Vec<Schedule>> {
    let (start, end) = week_bounds(Local::now().date_naive());
    self.inner.store.get_schedules_in_range(start, end)
  }

  pub fn get_all_attendance(&self) -> Result<Vec<Attendance>> {
    self.inner.store.get_all_attendances()
  }

  pub fn pending_actions(&self) -> Result<Vec<PendingAction>> {
    self.inner.store.get_pending_actions()
  }

  pub fn pending_count(&self) -> Result<usize> {
    self.inner.store.get_pending_action_count()
  }

  pub fn last_sync_time(&self, category: SyncCategory) -> Result<Option<DateTime<Utc>>> {
    self.inner.store.get_last_sync_time(category.key())
  }

  // ==========================================================================
  // Queue maintenance
  // ==========================================================================

  /// Put actions stranded in `SYNCING` by a crash back into the queue.
  pub fn recover_interrupted(&self) -> Result<usize> {
    self.inner.store.reset_syncing_actions()
  }

  /// Give a `FAILED` action a fresh set of retries. Returns `false` when no
  /// failed action has this id.
  pub fn retry_failed(&self, action_id: &str) -> Result<bool> {
    match self.inner.store.get_pending_action(action_id)? {
      Some(action) if action.status == ActionStatus::Failed => {
        self.inner.store.update_pending_action(
          action_id,
          ActionUpdate {
            status: Some(ActionStatus::Pending),
            retry_count: Some(0),
            last_error: Some(None),
          },
        )?;
        info!(action_id, "Failed action requeued");
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  /// Drop an action from the queue whatever its status.
  pub fn discard_action(&self, action_id: &str) -> Result<bool> {
    if self.inner.store.get_pending_action(action_id)?.is_none() {
      return Ok(false);
    }
    self.inner.store.remove_pending_action(action_id)?;
    info!(action_id, "Action discarded");
    Ok(true)
  }

  /// Wipe every local collection (logout).
  pub fn reset(&self) -> Result<()> {
    self.inner.store.clear_all()
  }
}

/// Body sent when replaying a queued action.
fn replay_body(action: &PendingAction) -> Value {
  let mut body = action.payload.clone();
  body.insert(OFFLINE_SYNC_KEY.to_string(), Value::Bool(true));
  body.insert(ORIGINAL_TIMESTAMP_KEY.to_string(), Value::from(action.timestamp));
  Value::Object(body)
}

/// Monday through Sunday of the week containing `date`.
pub(crate) fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
  let start = date - DateDuration::days(i64::from(date.weekday().num_days_from_monday()));
  (start, start + DateDuration::days(6))
}

/// First and last day of the month containing `date`.
pub(crate) fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
  let start = date.with_day(1).unwrap_or(date);
  let end = start
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .unwrap_or(date);
  (start, end)
}

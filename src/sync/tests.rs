use chrono::{Local, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};

use super::engine::{month_bounds, week_bounds};
use super::*;
use crate::event::SyncEvent;
use crate::remote::{Backend, Endpoint};
use crate::store::{
  ActionStatus, ActionType, ActionUpdate, LocalStore, Payload, Schedule, SqliteStore,
  SyncCategory,
};

/// Pauses deliveries until released.
#[derive(Default)]
struct Gate {
  entered: Notify,
  release: Notify,
}

#[derive(Default)]
struct MockState {
  posts: Mutex<Vec<(Endpoint, Value)>>,
  post_times: Mutex<Vec<Instant>>,
  /// Popped per POST; an empty script means success
  post_outcomes: Mutex<VecDeque<Result<(), String>>>,
  /// GET responses keyed by path prefix; missing means HTTP 404
  reads: Mutex<HashMap<&'static str, Result<Value, String>>>,
  reachable: Mutex<bool>,
  gate: Mutex<Option<Arc<Gate>>>,
}

#[derive(Clone, Default)]
struct MockBackend {
  state: Arc<MockState>,
}

impl MockBackend {
  fn fail_posts(&self, errors: &[&str]) {
    let mut outcomes = self.state.post_outcomes.lock().unwrap();
    outcomes.extend(errors.iter().map(|e| Err(e.to_string())));
  }

  fn script_posts(&self, script: Vec<Result<(), String>>) {
    self.state.post_outcomes.lock().unwrap().extend(script);
  }

  fn respond(&self, prefix: &'static str, response: Result<Value, String>) {
    self.state.reads.lock().unwrap().insert(prefix, response);
  }

  fn set_reachable(&self, reachable: bool) {
    *self.state.reachable.lock().unwrap() = reachable;
  }

  fn hold_posts(&self) -> Arc<Gate> {
    let gate = Arc::new(Gate::default());
    *self.state.gate.lock().unwrap() = Some(Arc::clone(&gate));
    gate
  }

  fn posts(&self) -> Vec<(Endpoint, Value)> {
    self.state.posts.lock().unwrap().clone()
  }

  fn post_times(&self) -> Vec<Instant> {
    self.state.post_times.lock().unwrap().clone()
  }

  fn post_count(&self) -> usize {
    self.state.posts.lock().unwrap().len()
  }
}

impl Backend for MockBackend {
  async fn post(&self, endpoint: &Endpoint, body: Value) -> Result<Value> {
    self
      .state
      .posts
      .lock()
      .unwrap()
      .push((endpoint.clone(), body));
    self.state.post_times.lock().unwrap().push(Instant::now());

    let gate = self.state.gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.entered.notify_one();
      gate.release.notified().await;
    }

    let outcome = self
      .state
      .post_outcomes
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or(Ok(()));
    outcome.map(|()| json!({ "ok": true })).map_err(|e| eyre!(e))
  }

  async fn get(&self, endpoint: &Endpoint) -> Result<Value> {
    let path = endpoint.path();
    let response = self
      .state
      .reads
      .lock()
      .unwrap()
      .iter()
      .find(|(prefix, _)| path.starts_with(*prefix))
      .map(|(_, response)| response.clone());

    match response {
      Some(Ok(body)) => Ok(body),
      Some(Err(e)) => Err(eyre!(e)),
      None => Err(eyre!("HTTP 404: {}", path)),
    }
  }

  async fn ping(&self) -> Result<()> {
    if *self.state.reachable.lock().unwrap() {
      Ok(())
    } else {
      Err(eyre!("connection refused"))
    }
  }
}

fn settings() -> SyncSettings {
  SyncSettings {
    interval: Duration::from_secs(3600),
    settle_delay: Duration::ZERO,
    throttle: Duration::ZERO,
    max_retries: 3,
    probe_interval: Duration::from_secs(3600),
  }
}

fn engine(backend: &MockBackend) -> SyncEngine<SqliteStore, MockBackend> {
  SyncEngine::new(SqliteStore::in_memory(), backend.clone(), settings())
}

fn payload(value: Value) -> Payload {
  value.as_object().cloned().unwrap()
}

fn schedule(id: &str, date: NaiveDate) -> Schedule {
  Schedule {
    id: id.to_string(),
    work_date: date,
    start_time: None,
    end_time: None,
    position: None,
    status: None,
    cached_at: chrono::Utc::now(),
  }
}

#[tokio::test]
async fn test_offline_check_in_replays_once_back_online() {
  let backend = MockBackend::default();
  let engine = engine(&backend);

  let outcome = engine
    .record_check_in(payload(json!({ "site": "north", "note": "early" })))
    .await
    .unwrap();
  assert!(outcome.queued);
  assert_eq!(backend.post_count(), 0);

  let action_id = outcome.action_id.unwrap();
  let queued = engine.store().get_pending_action(&action_id).unwrap().unwrap();
  assert!(queued.payload.contains_key(CLIENT_TIMESTAMP_KEY));

  let engine = engine.with_online(true);
  let report = engine.sync().await;
  assert_eq!(report.success, 1);
  assert_eq!(report.failed, 0);
  assert_eq!(report.pending, 0);

  let posts = backend.posts();
  assert_eq!(posts.len(), 1);
  let (endpoint, body) = &posts[0];
  assert_eq!(*endpoint, Endpoint::CheckIn);
  assert_eq!(body["site"], "north");
  assert_eq!(body["note"], "early");
  assert_eq!(body[OFFLINE_SYNC_KEY], true);
  assert_eq!(body[ORIGINAL_TIMESTAMP_KEY], queued.timestamp);
  assert_eq!(engine.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_online_write_goes_straight_to_backend() {
  let backend = MockBackend::default();
  let engine = engine(&backend).with_online(true);

  let outcome = engine
    .record_check_out(payload(json!({ "note": "done" })))
    .await
    .unwrap();

  assert_eq!(outcome, WriteOutcome::delivered());
  assert_eq!(engine.pending_count().unwrap(), 0);
  let posts = backend.posts();
  assert_eq!(posts.len(), 1);
  assert_eq!(posts[0].0, Endpoint::CheckOut);
  assert_eq!(posts[0].1, json!({ "note": "done" }));
}

#[tokio::test]
async fn test_failed_online_write_falls_back_to_queue() {
  let backend = MockBackend::default();
  backend.fail_posts(&["HTTP 503: unavailable"]);
  let engine = engine(&backend).with_online(true);

  let outcome = engine
    .submit_leave_request(payload(json!({ "from": "2024-04-01", "to": "2024-04-03" })))
    .await
    .unwrap();

  assert!(outcome.queued);
  let actions = engine.pending_actions().unwrap();
  assert_eq!(actions.len(), 1);
  assert_eq!(actions[0].action_type, ActionType::LeaveRequest);
  assert_eq!(actions[0].payload["from"], "2024-04-01");
  assert_eq!(actions[0].retry_count, 0);
  assert_eq!(actions[0].status, ActionStatus::Pending);
}

#[tokio::test]
async fn test_failure_increments_retry_count_by_one() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  engine
    .submit_schedule_change(payload(json!({ "date": "2024-04-02" })))
    .await
    .unwrap();

  let engine = engine.with_online(true);
  backend.fail_posts(&["HTTP 400: bad date"]);
  let report = engine.sync().await;

  assert_eq!(report.failed, 1);
  assert_eq!(report.errors[0].error, "HTTP 400: bad date");
  let action = &engine.pending_actions().unwrap()[0];
  assert_eq!(action.retry_count, 1);
  assert_eq!(action.status, ActionStatus::Pending);
  assert_eq!(action.last_error.as_deref(), Some("HTTP 400: bad date"));
}

#[tokio::test]
async fn test_three_failures_make_action_terminal() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  let action_id = engine
    .record_check_in(Payload::new())
    .await
    .unwrap()
    .action_id
    .unwrap();

  let engine = engine.with_online(true);
  backend.fail_posts(&["timeout", "timeout", "HTTP 502"]);
  for _ in 0..3 {
    engine.sync().await;
  }

  let action = engine.store().get_pending_action(&action_id).unwrap().unwrap();
  assert_eq!(action.status, ActionStatus::Failed);
  assert_eq!(action.retry_count, 3);
  assert_eq!(action.last_error.as_deref(), Some("HTTP 502"));
  assert_eq!(backend.post_count(), 3);

  let report = engine.sync().await;
  assert_eq!(report.attempts(), 0);
  assert_eq!(report.pending, 1);
  assert_eq!(backend.post_count(), 3);
  assert!(engine.store().get_pending_action(&action_id).unwrap().is_some());
}

#[tokio::test]
async fn test_pass_keeps_failed_action_and_drops_delivered_one() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  let first = engine
    .record_check_in(payload(json!({ "n": 1 })))
    .await
    .unwrap()
    .action_id
    .unwrap();
  let second = engine
    .record_check_out(payload(json!({ "n": 2 })))
    .await
    .unwrap()
    .action_id
    .unwrap();

  let engine = engine.with_online(true);
  backend.script_posts(vec![Err("HTTP 500".to_string()), Ok(())]);
  let report = engine.sync().await;

  assert_eq!(report.success, 1);
  assert_eq!(report.failed, 1);
  assert_eq!(report.pending, 1);
  assert_eq!(report.errors[0].action_id, first);

  let posts = backend.posts();
  assert_eq!(posts[0].0, Endpoint::CheckIn);
  assert_eq!(posts[1].0, Endpoint::CheckOut);

  let remaining = engine.pending_actions().unwrap();
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].id, first);
  assert_eq!(remaining[0].status, ActionStatus::Pending);
  assert_eq!(remaining[0].retry_count, 1);
  assert!(engine.store().get_pending_action(&second).unwrap().is_none());
}

#[tokio::test]
async fn test_sync_refused_while_offline() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  for _ in 0..2 {
    engine.record_check_in(Payload::new()).await.unwrap();
  }

  let report = engine.sync().await;

  assert_eq!(report.attempts(), 0);
  assert_eq!(report.pending, 2);
  assert_eq!(backend.post_count(), 0);
}

#[tokio::test]
async fn test_sync_refused_while_another_pass_runs() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  engine.record_check_in(Payload::new()).await.unwrap();
  let engine = engine.with_online(true);

  let gate = backend.hold_posts();
  let first = tokio::spawn({
    let engine = engine.clone();
    async move { engine.sync().await }
  });
  timeout(Duration::from_secs(5), gate.entered.notified())
    .await
    .unwrap();
  assert!(engine.is_syncing());

  let second = engine.sync().await;
  assert_eq!(second.attempts(), 0);
  assert_eq!(second.pending, 1);
  assert_eq!(backend.post_count(), 1);

  gate.release.notify_one();
  let first = timeout(Duration::from_secs(5), first)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(first.success, 1);
  assert!(!engine.is_syncing());
}

#[tokio::test]
async fn test_action_discarded_mid_pass_is_not_delivered() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  let first = engine
    .record_check_in(Payload::new())
    .await
    .unwrap()
    .action_id
    .unwrap();
  let second = engine
    .record_check_out(Payload::new())
    .await
    .unwrap()
    .action_id
    .unwrap();
  let engine = engine.with_online(true);
  let mut events = engine.subscribe();

  let gate = backend.hold_posts();
  let pass = tokio::spawn({
    let engine = engine.clone();
    async move { engine.sync().await }
  });
  timeout(Duration::from_secs(5), gate.entered.notified())
    .await
    .unwrap();

  assert!(engine.discard_action(&second).unwrap());
  gate.release.notify_one();
  let report = timeout(Duration::from_secs(5), pass)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(report.success, 1);
  assert_eq!(report.failed, 0);
  assert_eq!(report.pending, 0);
  let posts = backend.posts();
  assert_eq!(posts.len(), 1);
  assert_eq!(posts[0].0, Endpoint::CheckIn);

  let mut synced = Vec::new();
  while let Some(event) = events.try_next() {
    if let SyncEvent::ActionSynced { action_id } = event {
      synced.push(action_id);
    }
  }
  assert_eq!(synced, vec![first]);
}

#[tokio::test]
async fn test_reset_mid_pass_stops_delivery() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  for _ in 0..3 {
    engine.record_check_in(Payload::new()).await.unwrap();
  }
  let engine = engine.with_online(true);

  let gate = backend.hold_posts();
  let pass = tokio::spawn({
    let engine = engine.clone();
    async move { engine.sync().await }
  });
  timeout(Duration::from_secs(5), gate.entered.notified())
    .await
    .unwrap();

  engine.reset().unwrap();
  gate.release.notify_one();
  let report = timeout(Duration::from_secs(5), pass)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(backend.post_count(), 1);
  assert_eq!(report.success, 1);
  assert_eq!(report.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deliveries_are_spaced_by_throttle() {
  let backend = MockBackend::default();
  let throttle = Duration::from_millis(100);
  let engine = SyncEngine::new(
    SqliteStore::in_memory(),
    backend.clone(),
    SyncSettings {
      throttle,
      ..settings()
    },
  );
  engine.record_check_in(Payload::new()).await.unwrap();
  engine.record_check_out(Payload::new()).await.unwrap();
  let engine = engine.with_online(true);

  let started = Instant::now();
  let report = engine.sync().await;

  assert_eq!(report.success, 2);
  let times = backend.post_times();
  assert_eq!(times.len(), 2);
  assert_eq!(times[0], started);
  assert!(times[1] - times[0] >= throttle);
}

#[tokio::test(start_paused = true)]
async fn test_timer_syncs_while_online() {
  let backend = MockBackend::default();
  let engine = SyncEngine::new(
    SqliteStore::in_memory(),
    backend.clone(),
    SyncSettings {
      interval: Duration::from_secs(30),
      ..settings()
    },
  );
  engine.record_check_in(Payload::new()).await.unwrap();
  let engine = engine.with_online(true);
  engine.start().unwrap();

  tokio::time::sleep(Duration::from_secs(29)).await;
  assert_eq!(backend.post_count(), 0);

  tokio::time::sleep(Duration::from_secs(2)).await;
  assert_eq!(backend.post_count(), 1);
  assert_eq!(engine.pending_count().unwrap(), 0);
  engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_timer_idles_while_offline() {
  let backend = MockBackend::default();
  let engine = SyncEngine::new(
    SqliteStore::in_memory(),
    backend.clone(),
    SyncSettings {
      interval: Duration::from_secs(30),
      ..settings()
    },
  );
  engine.record_check_in(Payload::new()).await.unwrap();
  engine.start().unwrap();

  tokio::time::sleep(Duration::from_secs(95)).await;

  assert_eq!(backend.post_count(), 0);
  assert_eq!(engine.pending_count().unwrap(), 1);
  engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_monitor_brings_engine_online_and_syncs() {
  let backend = MockBackend::default();
  let engine = SyncEngine::new(
    SqliteStore::in_memory(),
    backend.clone(),
    SyncSettings {
      probe_interval: Duration::from_secs(10),
      ..settings()
    },
  );
  engine.record_check_in(Payload::new()).await.unwrap();
  let mut events = engine.subscribe();

  let monitor = ConnectivityMonitor::spawn(engine.clone());
  tokio::time::sleep(Duration::from_secs(5)).await;
  assert!(!engine.is_online());
  assert_eq!(backend.post_count(), 0);

  backend.set_reachable(true);
  let completed = timeout(Duration::from_secs(30), async {
    loop {
      match events.next().await {
        Some(SyncEvent::SyncCompleted(report)) => break report,
        Some(_) => continue,
        None => panic!("event stream closed"),
      }
    }
  })
  .await
  .unwrap();

  assert!(engine.is_online());
  assert_eq!(completed.success, 1);
  assert_eq!(backend.post_count(), 1);
  monitor.stop();
}

#[tokio::test]
async fn test_events_follow_a_pass() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  let mut events = engine.subscribe();
  let ok = engine.record_check_in(Payload::new()).await.unwrap();
  let bad = engine.record_check_out(Payload::new()).await.unwrap();

  let engine = engine.with_online(true);
  backend.script_posts(vec![Ok(()), Err("HTTP 503".to_string())]);
  let report = engine.sync().await;

  assert_eq!(events.try_next(), Some(SyncEvent::SyncStarted));
  assert_eq!(
    events.try_next(),
    Some(SyncEvent::ActionSynced {
      action_id: ok.action_id.unwrap()
    })
  );
  assert_eq!(
    events.try_next(),
    Some(SyncEvent::ActionFailed {
      action_id: bad.action_id.unwrap(),
      error: "HTTP 503".to_string(),
      terminal: false,
    })
  );
  assert_eq!(events.try_next(), Some(SyncEvent::SyncCompleted(report)));
  assert_eq!(events.try_next(), None);
}

#[tokio::test]
async fn test_coming_online_triggers_sync() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  engine.record_check_in(Payload::new()).await.unwrap();
  let mut events = engine.subscribe();

  engine.set_online(true);

  assert_eq!(
    timeout(Duration::from_secs(5), events.next()).await.unwrap(),
    Some(SyncEvent::OnlineStatusChanged(true))
  );
  let completed = timeout(Duration::from_secs(5), async {
    loop {
      match events.next().await {
        Some(SyncEvent::SyncCompleted(report)) => break report,
        Some(_) => continue,
        None => panic!("event stream closed"),
      }
    }
  })
  .await
  .unwrap();

  assert_eq!(completed.success, 1);
  assert_eq!(engine.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_probe_tracks_reachability() {
  let backend = MockBackend::default();
  let engine = engine(&backend);

  assert!(!engine.probe().await);
  assert!(!engine.is_online());

  backend.set_reachable(true);
  assert!(engine.probe().await);
  assert!(engine.is_online());
}

#[tokio::test]
async fn test_partial_refresh_failure_leaves_other_categories_alone() {
  let backend = MockBackend::default();
  backend.respond(
    "me/profile",
    Ok(json!({ "data": { "id": "u-1", "name": "Alex", "role": "cook" } })),
  );
  backend.respond("me/schedules", Err("HTTP 500: boom".to_string()));
  backend.respond(
    "me/attendances",
    Ok(json!({ "data": [{ "id": 1, "workDate": "2024-03-01", "status": "done" }] })),
  );

  let engine = engine(&backend).with_online(true);
  let old = schedule("stale", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
  engine.store().save_schedules(&[old.clone()]).unwrap();

  let report = engine.refresh_cache().await;

  assert!(!report.is_complete());
  assert_eq!(
    report.refreshed,
    vec![SyncCategory::Profile, SyncCategory::Attendances]
  );
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.failed[0].0, SyncCategory::Schedules);

  assert_eq!(engine.get_profile().unwrap().unwrap().name, "Alex");
  assert!(engine.last_sync_time(SyncCategory::Profile).unwrap().is_some());
  assert!(engine.last_sync_time(SyncCategory::Attendances).unwrap().is_some());
  assert!(engine.last_sync_time(SyncCategory::Schedules).unwrap().is_none());
  assert_eq!(engine.store().get_all_schedules().unwrap(), vec![old]);
  assert_eq!(engine.get_all_attendance().unwrap()[0].id, "1");
}

#[tokio::test]
async fn test_refresh_replaces_schedules_and_serves_today() {
  let today = Local::now().date_naive();
  let backend = MockBackend::default();
  backend.respond(
    "me/schedules",
    Ok(json!([{ "id": "s-today", "workDate": today.to_string(), "startTime": "10:00" }])),
  );

  let engine = engine(&backend).with_online(true);
  engine
    .store()
    .save_schedules(&[schedule("gone", today)])
    .unwrap();

  let report = engine.refresh_cache().await;
  assert!(report.refreshed.contains(&SyncCategory::Schedules));

  let store = engine.store();
  let today_schedule = store.get_schedule_by_date(today).unwrap().unwrap();
  assert_eq!(today_schedule.id, "s-today");
  assert_eq!(today_schedule.start_time.as_deref(), Some("10:00"));
  let (start, end) = week_bounds(today);
  let week = store.get_schedules_in_range(start, end).unwrap();
  assert_eq!(week.len(), 1);
}

#[tokio::test]
async fn test_refresh_skipped_while_offline() {
  let backend = MockBackend::default();
  backend.respond("me/profile", Ok(json!({ "id": "u-1", "name": "Alex" })));
  let engine = engine(&backend);

  let report = engine.refresh_cache().await;

  assert!(report.skipped);
  assert!(engine.get_profile().unwrap().is_none());
}

#[tokio::test]
async fn test_start_recovers_interrupted_deliveries() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  let id = engine
    .record_check_in(Payload::new())
    .await
    .unwrap()
    .action_id
    .unwrap();
  engine
    .store()
    .update_pending_action(&id, ActionUpdate::status(ActionStatus::Syncing))
    .unwrap();

  engine.start().unwrap();
  engine.shutdown();

  let action = engine.store().get_pending_action(&id).unwrap().unwrap();
  assert_eq!(action.status, ActionStatus::Pending);
}

#[tokio::test]
async fn test_retry_and_discard_failed_actions() {
  let backend = MockBackend::default();
  let engine = engine(&backend);
  let failed = engine
    .record_check_in(Payload::new())
    .await
    .unwrap()
    .action_id
    .unwrap();
  let pending = engine
    .record_check_out(Payload::new())
    .await
    .unwrap()
    .action_id
    .unwrap();
  engine
    .store()
    .update_pending_action(
      &failed,
      ActionUpdate {
        status: Some(ActionStatus::Failed),
        retry_count: Some(3),
        last_error: Some(Some("HTTP 500".to_string())),
      },
    )
    .unwrap();

  assert!(!engine.retry_failed(&pending).unwrap());
  assert!(engine.retry_failed(&failed).unwrap());
  let action = engine.store().get_pending_action(&failed).unwrap().unwrap();
  assert_eq!(action.status, ActionStatus::Pending);
  assert_eq!(action.retry_count, 0);
  assert_eq!(action.last_error, None);

  assert!(engine.discard_action(&pending).unwrap());
  assert!(!engine.discard_action(&pending).unwrap());
  assert_eq!(engine.pending_count().unwrap(), 1);
}

#[test]
fn test_week_bounds_run_monday_to_sunday() {
  // 2024-03-06 is a Wednesday
  let (start, end) = week_bounds(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
  assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
  assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());

  let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
  assert_eq!(week_bounds(sunday).0, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
}

#[test]
fn test_month_bounds_handle_leap_february_and_december() {
  let (start, end) = month_bounds(NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
  assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
  assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

  let (start, end) = month_bounds(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
  assert_eq!(start, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
  assert_eq!(end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
}

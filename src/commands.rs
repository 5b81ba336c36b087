//! CLI subcommands and their handlers.

use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::event::SyncEvent;
use crate::remote::Backend;
use crate::store::{ActionStatus, LocalStore, Payload, PendingAction, Schedule, SyncCategory};
use crate::sync::{ConnectivityMonitor, RefreshReport, SyncEngine, SyncReport, WriteOutcome};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Clock in (queued if the backend is unreachable)
  ClockIn {
    #[arg(long)]
    note: Option<String>,
    /// Free-form location, e.g. a site code or "lat,lng"
    #[arg(long)]
    location: Option<String>,
  },
  /// Clock out (queued if the backend is unreachable)
  ClockOut {
    #[arg(long)]
    note: Option<String>,
    #[arg(long)]
    location: Option<String>,
  },
  /// Request leave for an inclusive date range
  Leave {
    #[arg(long)]
    from: NaiveDate,
    #[arg(long)]
    to: NaiveDate,
    #[arg(long, default_value = "annual")]
    kind: String,
    #[arg(long)]
    reason: Option<String>,
  },
  /// Ask for a shift on the given date to be changed
  ScheduleChange {
    #[arg(long)]
    date: NaiveDate,
    #[arg(long)]
    reason: Option<String>,
  },
  /// Deliver queued actions now
  Sync,
  /// Refresh cached profile, schedule and attendance
  Refresh,
  /// Show connectivity, queue size and cache freshness
  Status,
  /// List queued actions
  Pending,
  /// Give a failed action a fresh set of retries
  Retry { id: String },
  /// Drop an action from the queue
  Discard { id: String },
  /// Show today's cached shift
  Today,
  /// Show this week's cached shifts
  Week,
  /// Wipe all local data (logout)
  Reset {
    /// Confirm that queued actions may be lost
    #[arg(long)]
    yes: bool,
  },
  /// Keep syncing in the foreground until Ctrl-C
  Run,
}

/// Execute one subcommand.
pub async fn run<S, B>(engine: &SyncEngine<S, B>, command: Command, force_offline: bool) -> Result<()>
where
  S: LocalStore + 'static,
  B: Backend,
{
  engine.store().init()?;

  match command {
    Command::ClockIn { note, location } => {
      connect(engine, force_offline).await;
      let outcome = engine
        .record_check_in(clock_payload(note, location))
        .await?;
      print_outcome("Clock-in", &outcome);
    }
    Command::ClockOut { note, location } => {
      connect(engine, force_offline).await;
      let outcome = engine
        .record_check_out(clock_payload(note, location))
        .await?;
      print_outcome("Clock-out", &outcome);
    }
    Command::Leave {
      from,
      to,
      kind,
      reason,
    } => {
      if to < from {
        return Err(eyre!("Leave ends ({}) before it starts ({})", to, from));
      }
      let mut payload = Payload::new();
      payload.insert("leave_type".to_string(), Value::String(kind));
      payload.insert("start_date".to_string(), Value::String(from.to_string()));
      payload.insert("end_date".to_string(), Value::String(to.to_string()));
      insert_opt(&mut payload, "reason", reason);

      connect(engine, force_offline).await;
      let outcome = engine.submit_leave_request(payload).await?;
      print_outcome("Leave request", &outcome);
    }
    Command::ScheduleChange { date, reason } => {
      let mut payload = Payload::new();
      payload.insert("date".to_string(), Value::String(date.to_string()));
      insert_opt(&mut payload, "reason", reason);

      connect(engine, force_offline).await;
      let outcome = engine.submit_schedule_change(payload).await?;
      print_outcome("Schedule change", &outcome);
    }
    Command::Sync => {
      if !connect(engine, force_offline).await {
        println!("Offline; {} action(s) waiting", engine.pending_count()?);
        return Ok(());
      }
      print_sync_report(&engine.sync().await);
    }
    Command::Refresh => {
      if !connect(engine, force_offline).await {
        println!("Offline; cache not refreshed");
        return Ok(());
      }
      print_refresh_report(&engine.refresh_cache().await);
    }
    Command::Status => {
      let online = connect(engine, force_offline).await;
      print_status(engine, online)?;
    }
    Command::Pending => {
      let actions = engine.pending_actions()?;
      if actions.is_empty() {
        println!("Queue is empty");
      }
      for action in &actions {
        println!("{}", describe_action(action));
      }
    }
    Command::Retry { id } => {
      if engine.retry_failed(&id)? {
        println!("Action {} will be retried on the next sync", id);
      } else {
        return Err(eyre!("No failed action with id {}", id));
      }
    }
    Command::Discard { id } => {
      if engine.discard_action(&id)? {
        println!("Action {} discarded", id);
      } else {
        return Err(eyre!("No queued action with id {}", id));
      }
    }
    Command::Today => match engine.get_today_schedule()? {
      Some(schedule) => println!("{}", describe_schedule(&schedule)),
      None => println!("No shift cached for today"),
    },
    Command::Week => {
      let week = engine.get_week_schedule()?;
      if week.is_empty() {
        println!("No shifts cached for this week");
      }
      for schedule in &week {
        println!("{}", describe_schedule(schedule));
      }
    }
    Command::Reset { yes } => {
      if !yes {
        return Err(eyre!(
          "Refusing to wipe local data without --yes ({} queued action(s) would be lost)",
          engine.pending_count()?
        ));
      }
      engine.reset()?;
      println!("Local data cleared");
    }
    Command::Run => run_foreground(engine, force_offline).await?,
  }

  Ok(())
}

/// Probe the backend unless forced offline. Returns the resulting state.
async fn connect<S, B>(engine: &SyncEngine<S, B>, force_offline: bool) -> bool
where
  S: LocalStore + 'static,
  B: Backend,
{
  if force_offline {
    return false;
  }
  // Assume reachable so a successful probe is not treated as a transition
  // (which would spawn a sync this short-lived process never waits for).
  engine.clone().with_online(true).probe().await
}

async fn run_foreground<S, B>(engine: &SyncEngine<S, B>, force_offline: bool) -> Result<()>
where
  S: LocalStore + 'static,
  B: Backend,
{
  let mut events = engine.subscribe();
  engine.start()?;

  let monitor = if force_offline {
    None
  } else {
    Some(ConnectivityMonitor::spawn(engine.clone()))
  };
  info!(pending = engine.pending_count()?, "Sync running, press Ctrl-C to stop");

  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  loop {
    tokio::select! {
      _ = &mut ctrl_c => break,
      event = events.next() => match event {
        Some(event) => log_event(&event),
        None => break,
      },
    }
  }

  if let Some(monitor) = monitor {
    monitor.stop();
  }
  engine.shutdown();
  info!("Sync stopped");
  Ok(())
}

fn log_event(event: &SyncEvent) {
  match event {
    SyncEvent::SyncStarted => {}
    SyncEvent::SyncCompleted(report) => {
      if report.attempts() > 0 {
        info!(
          success = report.success,
          failed = report.failed,
          pending = report.pending,
          "Sync complete"
        );
      }
    }
    SyncEvent::ActionSynced { action_id } => info!(action_id = %action_id, "Delivered"),
    SyncEvent::ActionFailed {
      action_id,
      error,
      terminal,
    } => {
      if *terminal {
        warn!(action_id = %action_id, "Delivery abandoned, needs attention: {}", error);
      } else {
        info!(action_id = %action_id, "Delivery failed, will retry: {}", error);
      }
    }
    SyncEvent::OnlineStatusChanged(online) => {
      info!("Backend {}", if *online { "reachable" } else { "unreachable" })
    }
  }
}

fn clock_payload(note: Option<String>, location: Option<String>) -> Payload {
  let mut payload = Payload::new();
  insert_opt(&mut payload, "note", note);
  insert_opt(&mut payload, "location", location);
  payload
}

fn insert_opt(payload: &mut Payload, key: &str, value: Option<String>) {
  if let Some(value) = value {
    payload.insert(key.to_string(), Value::String(value));
  }
}

fn print_outcome(what: &str, outcome: &WriteOutcome) {
  match &outcome.action_id {
    Some(id) if outcome.queued => println!("{} saved offline (action {})", what, id),
    _ => println!("{} recorded", what),
  }
}

fn print_sync_report(report: &SyncReport) {
  println!(
    "Synced {}, failed {}, still queued {}",
    report.success, report.failed, report.pending
  );
  for failure in &report.errors {
    println!("  {}: {}", failure.action_id, failure.error);
  }
}

fn print_refresh_report(report: &RefreshReport) {
  for category in &report.refreshed {
    println!("{:<12} refreshed", category.key());
  }
  for (category, error) in &report.failed {
    println!("{:<12} failed: {}", category.key(), error);
  }
  if !report.is_complete() {
    println!("Cached data may be stale; the failed categories keep their previous copy");
  }
}

fn print_status<S, B>(engine: &SyncEngine<S, B>, online: bool) -> Result<()>
where
  S: LocalStore + 'static,
  B: Backend,
{
  let actions = engine.pending_actions()?;
  let failed = actions
    .iter()
    .filter(|a| a.status == ActionStatus::Failed)
    .count();

  if let Some(profile) = engine.get_profile()? {
    match &profile.email {
      Some(email) => println!("User:      {} <{}>", profile.name, email),
      None => println!("User:      {}", profile.name),
    }
  }
  println!("Backend:   {}", if online { "reachable" } else { "unreachable" });
  if !engine.store().is_available() {
    println!("Storage:   unavailable, nothing is being saved");
  }
  println!("Queued:    {} ({} failed)", actions.len(), failed);
  println!("Attendance records cached: {}", engine.get_all_attendance()?.len());
  for category in SyncCategory::ALL {
    println!(
      "{:<10} {}",
      format!("{}:", category.key()),
      describe_time(engine.last_sync_time(category)?)
    );
  }
  Ok(())
}

fn describe_time(time: Option<DateTime<Utc>>) -> String {
  match time {
    Some(time) => time
      .with_timezone(&Local)
      .format("%Y-%m-%d %H:%M")
      .to_string(),
    None => "never".to_string(),
  }
}

fn describe_action(action: &PendingAction) -> String {
  let mut line = format!(
    "{}  {:<15} {:<7} {}  retries={}",
    action.id,
    action.action_type.as_str(),
    action.status.as_str(),
    describe_time(action.created_at()),
    action.retry_count
  );
  if let Some(error) = &action.last_error {
    line.push_str(&format!("  last error: {}", error));
  }
  line
}

fn describe_schedule(schedule: &Schedule) -> String {
  format!(
    "{}  {}-{}  {}",
    schedule.work_date.format("%a %Y-%m-%d"),
    schedule.start_time.as_deref().unwrap_or("?"),
    schedule.end_time.as_deref().unwrap_or("?"),
    schedule.position.as_deref().unwrap_or("")
  )
}

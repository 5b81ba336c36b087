//! Records held by the local store.

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Report};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Request body carried by a queued action.
pub type Payload = Map<String, Value>;

/// Kind of mutation a pending action replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
  CheckIn,
  CheckOut,
  LeaveRequest,
  ScheduleChange,
}

impl ActionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::CheckIn => "CHECK_IN",
      Self::CheckOut => "CHECK_OUT",
      Self::LeaveRequest => "LEAVE_REQUEST",
      Self::ScheduleChange => "SCHEDULE_CHANGE",
    }
  }
}

impl fmt::Display for ActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActionType {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "CHECK_IN" => Ok(Self::CheckIn),
      "CHECK_OUT" => Ok(Self::CheckOut),
      "LEAVE_REQUEST" => Ok(Self::LeaveRequest),
      "SCHEDULE_CHANGE" => Ok(Self::ScheduleChange),
      other => Err(eyre!("Unknown action type '{}'", other)),
    }
  }
}

/// Delivery state of a pending action.
///
/// `Pending -> Syncing -> {removed | Pending | Failed}`. `Failed` is terminal
/// until someone retries or discards the action explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
  Pending,
  Syncing,
  Failed,
}

impl ActionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Syncing => "SYNCING",
      Self::Failed => "FAILED",
    }
  }
}

impl fmt::Display for ActionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActionStatus {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING" => Ok(Self::Pending),
      "SYNCING" => Ok(Self::Syncing),
      "FAILED" => Ok(Self::Failed),
      other => Err(eyre!("Unknown action status '{}'", other)),
    }
  }
}

/// A queued mutation awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
  /// Generated at enqueue time, never reused
  pub id: String,
  pub action_type: ActionType,
  pub payload: Payload,
  /// Creation time in Unix milliseconds; defines queue order
  pub timestamp: i64,
  pub retry_count: u32,
  pub last_error: Option<String>,
  pub status: ActionStatus,
}

impl PendingAction {
  pub fn created_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(self.timestamp)
  }
}

/// Partial update merged into a stored action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionUpdate {
  pub status: Option<ActionStatus>,
  pub retry_count: Option<u32>,
  /// `Some(None)` clears the recorded error
  pub last_error: Option<Option<String>>,
}

impl ActionUpdate {
  pub fn status(status: ActionStatus) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub(crate) fn apply(self, action: &mut PendingAction) {
    if let Some(status) = self.status {
      action.status = status;
    }
    if let Some(retry_count) = self.retry_count {
      action.retry_count = retry_count;
    }
    if let Some(last_error) = self.last_error {
      action.last_error = last_error;
    }
  }
}

/// Cached snapshot of the signed-in staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: String,
  pub name: String,
  pub email: Option<String>,
  pub role: Option<String>,
  pub organization_id: Option<String>,
  pub cached_at: DateTime<Utc>,
}

/// One scheduled shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
  pub id: String,
  pub work_date: NaiveDate,
  pub start_time: Option<String>,
  pub end_time: Option<String>,
  pub position: Option<String>,
  pub status: Option<String>,
  pub cached_at: DateTime<Utc>,
}

/// One attendance record (a worked day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
  pub id: String,
  pub work_date: NaiveDate,
  pub check_in_at: Option<DateTime<Utc>>,
  pub check_out_at: Option<DateTime<Utc>>,
  pub status: Option<String>,
  pub work_minutes: Option<i64>,
  pub cached_at: DateTime<Utc>,
}

/// Cache categories tracked in sync metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCategory {
  Profile,
  Schedules,
  Attendances,
}

impl SyncCategory {
  pub const ALL: [SyncCategory; 3] = [Self::Profile, Self::Schedules, Self::Attendances];

  pub fn key(&self) -> &'static str {
    match self {
      Self::Profile => "profile",
      Self::Schedules => "schedules",
      Self::Attendances => "attendances",
    }
  }
}

impl fmt::Display for SyncCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

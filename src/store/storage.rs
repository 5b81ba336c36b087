//! Local store trait and SQLite implementation.

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::schema::{SCHEMA, SCHEMA_VERSION};
use super::types::{
  ActionStatus, ActionType, ActionUpdate, Attendance, Payload, PendingAction, Schedule,
  UserProfile,
};

/// Durable on-device storage used by the sync engine.
///
/// The store never initiates writes on its own and never retries; every call
/// either returns the requested result or the underlying storage error.
pub trait LocalStore: Send + Sync {
  /// Open the store and create its schema. Safe to call any number of times.
  fn init(&self) -> Result<()>;

  fn save_user_profile(&self, profile: &UserProfile) -> Result<()>;
  fn get_user_profile(&self) -> Result<Option<UserProfile>>;

  /// Replace every cached schedule with `schedules`.
  fn save_schedules(&self, schedules: &[Schedule]) -> Result<()>;
  fn get_schedule_by_date(&self, date: NaiveDate) -> Result<Option<Schedule>>;
  /// Schedules with `start <= work_date <= end`.
  fn get_schedules_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Schedule>>;
  fn get_all_schedules(&self) -> Result<Vec<Schedule>>;

  /// Replace every cached attendance record with `attendances`.
  fn save_attendances(&self, attendances: &[Attendance]) -> Result<()>;
  fn get_attendance_by_date(&self, date: NaiveDate) -> Result<Option<Attendance>>;
  fn get_attendances_in_range(&self, start: NaiveDate, end: NaiveDate)
    -> Result<Vec<Attendance>>;
  fn get_all_attendances(&self) -> Result<Vec<Attendance>>;

  /// Queue a new action. Assigns id, timestamp, `retry_count = 0` and `PENDING`.
  fn add_pending_action(&self, action_type: ActionType, payload: Payload)
    -> Result<PendingAction>;
  /// All queued actions in ascending timestamp order.
  fn get_pending_actions(&self) -> Result<Vec<PendingAction>>;
  fn get_pending_action(&self, id: &str) -> Result<Option<PendingAction>>;
  fn get_pending_actions_by_status(&self, status: ActionStatus) -> Result<Vec<PendingAction>>;
  /// Merge `update` into the stored action. Missing ids are ignored.
  fn update_pending_action(&self, id: &str, update: ActionUpdate) -> Result<()>;
  fn remove_pending_action(&self, id: &str) -> Result<()>;
  fn get_pending_action_count(&self) -> Result<usize>;
  /// Move actions left in `SYNCING` back to `PENDING`. Returns how many moved.
  fn reset_syncing_actions(&self) -> Result<usize>;

  /// Record "now" as the last successful refresh of `key`.
  fn set_last_sync_time(&self, key: &str) -> Result<()>;
  fn get_last_sync_time(&self, key: &str) -> Result<Option<DateTime<Utc>>>;

  /// Wipe every collection.
  fn clear_all(&self) -> Result<()>;

  /// Whether writes actually persist.
  fn is_available(&self) -> bool {
    true
  }
}

/// A cached record living in a date-indexed table.
trait DatedRecord: Serialize + DeserializeOwned {
  const TABLE: &'static str;

  fn record_id(&self) -> &str;

  fn work_date(&self) -> NaiveDate;
}

impl DatedRecord for Schedule {
  const TABLE: &'static str = "schedules";

  fn record_id(&self) -> &str {
    &self.id
  }

  fn work_date(&self) -> NaiveDate {
    self.work_date
  }
}

impl DatedRecord for Attendance {
  const TABLE: &'static str = "attendances";

  fn record_id(&self) -> &str {
    &self.id
  }

  fn work_date(&self) -> NaiveDate {
    self.work_date
  }
}

enum Location {
  Path(PathBuf),
  Memory,
}

enum StoreState {
  Closed,
  Open(Connection),
  /// No usable storage on this host; reads are empty and writes are dropped
  Unavailable,
}

/// SQLite-backed local store.
pub struct SqliteStore {
  location: Location,
  state: Mutex<StoreState>,
}

impl SqliteStore {
  /// Store at the default location, or in the degraded state when the host
  /// has no data directory.
  pub fn open_default() -> Self {
    match Self::default_path() {
      Some(path) => Self::at_path(path),
      None => {
        warn!("Could not determine data directory, offline queue will not persist");
        Self {
          location: Location::Memory,
          state: Mutex::new(StoreState::Unavailable),
        }
      }
    }
  }

  /// Store backed by the database file at `path`. Nothing is opened until
  /// the first call.
  pub fn at_path(path: impl Into<PathBuf>) -> Self {
    Self {
      location: Location::Path(path.into()),
      state: Mutex::new(StoreState::Closed),
    }
  }

  /// Store that lives only as long as this value.
  pub fn in_memory() -> Self {
    Self {
      location: Location::Memory,
      state: Mutex::new(StoreState::Closed),
    }
  }

  /// Get the default database path.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("shiftsync").join("offline.db"))
  }

  pub fn path(&self) -> Option<&Path> {
    match &self.location {
      Location::Path(path) => Some(path),
      Location::Memory => None,
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
    self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn open_state(&self) -> Result<StoreState> {
    let conn = match &self.location {
      Location::Memory => Connection::open_in_memory()
        .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?,
      Location::Path(path) => {
        if let Some(parent) = path.parent() {
          if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(
              "Cannot create storage directory {}: {}; offline queue will not persist",
              parent.display(),
              e
            );
            return Ok(StoreState::Unavailable);
          }
        }
        Connection::open(path)
          .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?
      }
    };

    run_migrations(&conn)?;
    debug!("Local store opened");
    Ok(StoreState::Open(conn))
  }

  /// Run `f` against the open connection, or return `unavailable` when the
  /// store is degraded.
  fn with_conn<T>(
    &self,
    unavailable: T,
    f: impl FnOnce(&mut Connection) -> Result<T>,
  ) -> Result<T> {
    let mut state = self.lock()?;
    if matches!(*state, StoreState::Closed) {
      *state = self.open_state()?;
    }

    match &mut *state {
      StoreState::Open(conn) => f(conn),
      _ => Ok(unavailable),
    }
  }

  fn replace_records<T: DatedRecord>(&self, records: &[T]) -> Result<()> {
    self.with_conn((), |conn| {
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      tx.execute(&format!("DELETE FROM {}", T::TABLE), [])
        .map_err(|e| eyre!("Failed to clear {}: {}", T::TABLE, e))?;

      for record in records {
        let data = serde_json::to_vec(record)
          .map_err(|e| eyre!("Failed to serialize {} record: {}", T::TABLE, e))?;
        tx.execute(
          &format!(
            "INSERT OR REPLACE INTO {} (id, work_date, data) VALUES (?, ?, ?)",
            T::TABLE
          ),
          params![record.record_id(), date_key(record.work_date()), data],
        )
        .map_err(|e| eyre!("Failed to store {} record: {}", T::TABLE, e))?;
      }

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

      debug!("Replaced {} with {} records", T::TABLE, records.len());
      Ok(())
    })
  }

  fn query_records<T: DatedRecord>(
    &self,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
  ) -> Result<Vec<T>> {
    self.with_conn(Vec::new(), |conn| {
      let sql = format!(
        "SELECT data FROM {} {} ORDER BY work_date, id",
        T::TABLE,
        filter
      );
      let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      let rows = stmt
        .query_map(args, |row| row.get::<_, Vec<u8>>(0))
        .map_err(|e| eyre!("Failed to query {}: {}", T::TABLE, e))?;

      let mut records = Vec::new();
      for data in rows {
        let data = data.map_err(|e| eyre!("Failed to read {} row: {}", T::TABLE, e))?;
        let record = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize {} record: {}", T::TABLE, e))?;
        records.push(record);
      }
      Ok(records)
    })
  }

  fn record_by_date<T: DatedRecord>(&self, date: NaiveDate) -> Result<Option<T>> {
    let key = date_key(date);
    let mut records = self.query_records::<T>("WHERE work_date = ?1", &[&key])?;
    if records.is_empty() {
      Ok(None)
    } else {
      Ok(Some(records.swap_remove(0)))
    }
  }

  fn records_in_range<T: DatedRecord>(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<T>> {
    let (start, end) = (date_key(start), date_key(end));
    self.query_records("WHERE work_date BETWEEN ?1 AND ?2", &[&start, &end])
  }

  fn query_actions(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<PendingAction>> {
    self.with_conn(Vec::new(), |conn| select_actions(conn, filter, args))
  }
}

impl LocalStore for SqliteStore {
  fn init(&self) -> Result<()> {
    self.with_conn((), |_| Ok(()))
  }

  fn is_available(&self) -> bool {
    self
      .lock()
      .map(|state| !matches!(*state, StoreState::Unavailable))
      .unwrap_or(false)
  }

  fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
    self.with_conn((), |conn| {
      let data =
        serde_json::to_vec(profile).map_err(|e| eyre!("Failed to serialize profile: {}", e))?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
      tx.execute("DELETE FROM user_profile", [])
        .map_err(|e| eyre!("Failed to clear profile: {}", e))?;
      tx.execute(
        "INSERT INTO user_profile (id, data, cached_at) VALUES (?, ?, ?)",
        params![profile.id, data, profile.cached_at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to store profile: {}", e))?;
      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
      Ok(())
    })
  }

  fn get_user_profile(&self) -> Result<Option<UserProfile>> {
    self.with_conn(None, |conn| {
      let data: Option<Vec<u8>> = conn
        .query_row("SELECT data FROM user_profile LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|e| eyre!("Failed to read profile: {}", e))?;

      data
        .map(|data| {
          serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize profile: {}", e))
        })
        .transpose()
    })
  }

  fn save_schedules(&self, schedules: &[Schedule]) -> Result<()> {
    self.replace_records(schedules)
  }

  fn get_schedule_by_date(&self, date: NaiveDate) -> Result<Option<Schedule>> {
    self.record_by_date(date)
  }

  fn get_schedules_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Schedule>> {
    self.records_in_range(start, end)
  }

  fn get_all_schedules(&self) -> Result<Vec<Schedule>> {
    self.query_records("", &[])
  }

  fn save_attendances(&self, attendances: &[Attendance]) -> Result<()> {
    self.replace_records(attendances)
  }

  fn get_attendance_by_date(&self, date: NaiveDate) -> Result<Option<Attendance>> {
    self.record_by_date(date)
  }

  fn get_attendances_in_range(
    &self,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<Attendance>> {
    self.records_in_range(start, end)
  }

  fn get_all_attendances(&self) -> Result<Vec<Attendance>> {
    self.query_records("", &[])
  }

  fn add_pending_action(
    &self,
    action_type: ActionType,
    payload: Payload,
  ) -> Result<PendingAction> {
    let now = Utc::now().timestamp_millis();
    let unsaved = new_action(action_type, payload.clone(), now);

    self.with_conn(unsaved, |conn| {
      // Keep queue order strict even when the clock stalls or steps back.
      let newest: Option<i64> = conn
        .query_row("SELECT MAX(timestamp) FROM pending_actions", [], |row| {
          row.get(0)
        })
        .map_err(|e| eyre!("Failed to read queue head: {}", e))?;
      let timestamp = match newest {
        Some(newest) if newest >= now => newest + 1,
        _ => now,
      };

      let action = new_action(action_type, payload, timestamp);
      let payload_json = serde_json::to_string(&action.payload)
        .map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

      conn
        .execute(
          "INSERT INTO pending_actions (id, action_type, payload, timestamp, retry_count, last_error, status)
           VALUES (?, ?, ?, ?, ?, ?, ?)",
          params![
            action.id,
            action.action_type.as_str(),
            payload_json,
            action.timestamp,
            action.retry_count,
            action.last_error,
            action.status.as_str(),
          ],
        )
        .map_err(|e| eyre!("Failed to queue action: {}", e))?;

      debug!(action_id = %action.id, action_type = %action.action_type, "Queued action");
      Ok(action)
    })
  }

  fn get_pending_actions(&self) -> Result<Vec<PendingAction>> {
    self.query_actions("", &[])
  }

  fn get_pending_action(&self, id: &str) -> Result<Option<PendingAction>> {
    Ok(self.query_actions("WHERE id = ?1", &[&id])?.pop())
  }

  fn get_pending_actions_by_status(&self, status: ActionStatus) -> Result<Vec<PendingAction>> {
    self.query_actions("WHERE status = ?1", &[&status.as_str()])
  }

  fn update_pending_action(&self, id: &str, update: ActionUpdate) -> Result<()> {
    self.with_conn((), |conn| {
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      let Some(mut action) = select_actions(&tx, "WHERE id = ?1", &[&id])?.pop() else {
        debug!(action_id = id, "Update skipped, action no longer queued");
        return Ok(());
      };
      update.apply(&mut action);

      tx.execute(
        "UPDATE pending_actions SET status = ?, retry_count = ?, last_error = ? WHERE id = ?",
        params![
          action.status.as_str(),
          action.retry_count,
          action.last_error,
          id
        ],
      )
      .map_err(|e| eyre!("Failed to update action {}: {}", id, e))?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
      Ok(())
    })
  }

  fn remove_pending_action(&self, id: &str) -> Result<()> {
    self.with_conn((), |conn| {
      conn
        .execute("DELETE FROM pending_actions WHERE id = ?", params![id])
        .map_err(|e| eyre!("Failed to remove action {}: {}", id, e))?;
      Ok(())
    })
  }

  fn get_pending_action_count(&self) -> Result<usize> {
    self.with_conn(0, |conn| {
      let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))
        .map_err(|e| eyre!("Failed to count actions: {}", e))?;
      Ok(usize::try_from(count).unwrap_or(0))
    })
  }

  fn reset_syncing_actions(&self) -> Result<usize> {
    self.with_conn(0, |conn| {
      conn
        .execute(
          "UPDATE pending_actions SET status = ? WHERE status = ?",
          params![ActionStatus::Pending.as_str(), ActionStatus::Syncing.as_str()],
        )
        .map_err(|e| eyre!("Failed to reset interrupted actions: {}", e))
    })
  }

  fn set_last_sync_time(&self, key: &str) -> Result<()> {
    self.with_conn((), |conn| {
      conn
        .execute(
          "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
          params![key, Utc::now().to_rfc3339()],
        )
        .map_err(|e| eyre!("Failed to record sync time for {}: {}", key, e))?;
      Ok(())
    })
  }

  fn get_last_sync_time(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
    self.with_conn(None, |conn| {
      let value: Option<String> = conn
        .query_row(
          "SELECT value FROM metadata WHERE key = ?",
          params![key],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| eyre!("Failed to read sync time for {}: {}", key, e))?;

      value
        .map(|s| {
          DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| eyre!("Failed to parse sync time '{}': {}", s, e))
        })
        .transpose()
    })
  }

  fn clear_all(&self) -> Result<()> {
    self.with_conn((), |conn| {
      conn
        .execute_batch(
          "DELETE FROM user_profile;
           DELETE FROM schedules;
           DELETE FROM attendances;
           DELETE FROM pending_actions;
           DELETE FROM metadata;",
        )
        .map_err(|e| eyre!("Failed to clear local store: {}", e))
    })
  }
}

/// Run database migrations.
fn run_migrations(conn: &Connection) -> Result<()> {
  conn
    .execute_batch(SCHEMA)
    .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
  conn
    .pragma_update(None, "user_version", SCHEMA_VERSION)
    .map_err(|e| eyre!("Failed to set schema version: {}", e))?;
  Ok(())
}

fn new_action(action_type: ActionType, payload: Payload, timestamp: i64) -> PendingAction {
  let suffix = Uuid::new_v4().simple().to_string();
  PendingAction {
    id: format!("{}-{}", timestamp, &suffix[..9]),
    action_type,
    payload,
    timestamp,
    retry_count: 0,
    last_error: None,
    status: ActionStatus::Pending,
  }
}

fn date_key(date: NaiveDate) -> String {
  date.format("%Y-%m-%d").to_string()
}

struct ActionRow {
  id: String,
  action_type: String,
  payload: String,
  timestamp: i64,
  retry_count: u32,
  last_error: Option<String>,
  status: String,
}

impl ActionRow {
  fn into_action(self) -> Result<PendingAction> {
    let payload = serde_json::from_str(&self.payload)
      .map_err(|e| eyre!("Failed to parse payload of action {}: {}", self.id, e))?;
    Ok(PendingAction {
      action_type: self.action_type.parse()?,
      status: self.status.parse()?,
      payload,
      timestamp: self.timestamp,
      retry_count: self.retry_count,
      last_error: self.last_error,
      id: self.id,
    })
  }
}

fn select_actions(
  conn: &Connection,
  filter: &str,
  args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<PendingAction>> {
  let sql = format!(
    "SELECT id, action_type, payload, timestamp, retry_count, last_error, status
     FROM pending_actions {} ORDER BY timestamp ASC",
    filter
  );
  let mut stmt = conn
    .prepare(&sql)
    .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

  let rows = stmt
    .query_map(args, |row| {
      Ok(ActionRow {
        id: row.get(0)?,
        action_type: row.get(1)?,
        payload: row.get(2)?,
        timestamp: row.get(3)?,
        retry_count: row.get(4)?,
        last_error: row.get(5)?,
        status: row.get(6)?,
      })
    })
    .map_err(|e| eyre!("Failed to query actions: {}", e))?;

  let mut actions = Vec::new();
  for row in rows {
    let row = row.map_err(|e| eyre!("Failed to read action row: {}", e))?;
    actions.push(row.into_action()?);
  }
  Ok(actions)
}

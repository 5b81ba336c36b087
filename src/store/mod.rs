//! Durable on-device storage for the offline queue and cached read-models.
//!
//! Five collections live in one SQLite database:
//! - `user_profile`: the signed-in staff member
//! - `schedules`, `attendances`: time series indexed by `work_date`
//! - `pending_actions`: mutations waiting to be delivered
//! - `metadata`: last successful refresh per cache category

mod schema;
mod storage;
mod types;

pub use storage::{LocalStore, SqliteStore};
pub use types::{
  ActionStatus, ActionType, ActionUpdate, Attendance, Payload, PendingAction, Schedule,
  SyncCategory, UserProfile,
};

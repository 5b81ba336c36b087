//! Serde-deserializable types matching backend read responses.
//!
//! These types are separate from the cached records so the wire format can
//! drift (camelCase vs snake_case, numeric vs string ids, enveloped vs bare
//! bodies) without touching the local schema.

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::store::{Attendance, Schedule, UserProfile};

/// Decode a response body that may or may not be wrapped in `{ "data": ... }`.
pub fn decode<T: DeserializeOwned>(body: Value) -> Result<T> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
  }

  let envelope: Envelope<T> =
    serde_json::from_value(body).map_err(|e| eyre!("Unexpected response shape: {}", e))?;
  Ok(match envelope {
    Envelope::Wrapped { data } => data,
    Envelope::Bare(data) => data,
  })
}

/// Accept ids sent either as strings or as numbers.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}

// ============================================================================
// Profile reader
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProfile {
  #[serde(deserialize_with = "de_id")]
  pub id: String,
  #[serde(alias = "fullName", alias = "full_name")]
  pub name: String,
  pub email: Option<String>,
  pub role: Option<String>,
  #[serde(alias = "organization_id", alias = "storeId")]
  pub organization_id: Option<String>,
}

impl ApiProfile {
  pub fn into_cached(self, cached_at: DateTime<Utc>) -> UserProfile {
    UserProfile {
      id: self.id,
      name: self.name,
      email: self.email,
      role: self.role,
      organization_id: self.organization_id,
      cached_at,
    }
  }
}

// ============================================================================
// Schedule reader
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSchedule {
  #[serde(deserialize_with = "de_id")]
  pub id: String,
  #[serde(alias = "work_date")]
  pub work_date: NaiveDate,
  #[serde(alias = "start_time")]
  pub start_time: Option<String>,
  #[serde(alias = "end_time")]
  pub end_time: Option<String>,
  pub position: Option<String>,
  pub status: Option<String>,
}

impl ApiSchedule {
  pub fn into_cached(self, cached_at: DateTime<Utc>) -> Schedule {
    Schedule {
      id: self.id,
      work_date: self.work_date,
      start_time: self.start_time,
      end_time: self.end_time,
      position: self.position,
      status: self.status,
      cached_at,
    }
  }
}

// ============================================================================
// Attendance reader
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAttendance {
  #[serde(deserialize_with = "de_id")]
  pub id: String,
  #[serde(alias = "work_date")]
  pub work_date: NaiveDate,
  #[serde(alias = "check_in_time", alias = "checkInAt")]
  pub check_in_time: Option<DateTime<Utc>>,
  #[serde(alias = "check_out_time", alias = "checkOutAt")]
  pub check_out_time: Option<DateTime<Utc>>,
  pub status: Option<String>,
  #[serde(alias = "work_minutes")]
  pub work_minutes: Option<i64>,
}

impl ApiAttendance {
  pub fn into_cached(self, cached_at: DateTime<Utc>) -> Attendance {
    Attendance {
      id: self.id,
      work_date: self.work_date,
      check_in_at: self.check_in_time,
      check_out_at: self.check_out_time,
      status: self.status,
      work_minutes: self.work_minutes,
      cached_at,
    }
  }
}

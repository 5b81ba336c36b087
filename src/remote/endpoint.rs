use chrono::NaiveDate;

use crate::store::ActionType;

/// Backend endpoints the sync engine talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  CheckIn,
  CheckOut,
  LeaveRequest,
  ScheduleChange,
  Profile,
  Schedules { start: NaiveDate, end: NaiveDate },
  Attendances { start: NaiveDate, end: NaiveDate },
  Health,
}

impl Endpoint {
  /// Endpoint an action of the given type is delivered to (always POST).
  pub fn for_action(action_type: ActionType) -> Self {
    match action_type {
      ActionType::CheckIn => Self::CheckIn,
      ActionType::CheckOut => Self::CheckOut,
      ActionType::LeaveRequest => Self::LeaveRequest,
      ActionType::ScheduleChange => Self::ScheduleChange,
    }
  }

  /// Path relative to the configured base URL.
  pub fn path(&self) -> String {
    match self {
      Self::CheckIn => "attendance/check-in".to_string(),
      Self::CheckOut => "attendance/check-out".to_string(),
      Self::LeaveRequest => "requests/leave".to_string(),
      Self::ScheduleChange => "requests/schedule-change".to_string(),
      Self::Profile => "me/profile".to_string(),
      Self::Schedules { start, end } => format!("me/schedules?start={}&end={}", start, end),
      Self::Attendances { start, end } => format!("me/attendances?start={}&end={}", start, end),
      Self::Health => "health".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_action_type_has_a_write_endpoint() {
    assert_eq!(Endpoint::for_action(ActionType::CheckIn).path(), "attendance/check-in");
    assert_eq!(Endpoint::for_action(ActionType::CheckOut).path(), "attendance/check-out");
    assert_eq!(Endpoint::for_action(ActionType::LeaveRequest).path(), "requests/leave");
    assert_eq!(
      Endpoint::for_action(ActionType::ScheduleChange).path(),
      "requests/schedule-change"
    );
  }

  #[test]
  fn test_range_endpoints_carry_iso_dates() {
    let endpoint = Endpoint::Schedules {
      start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
      end: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
    };
    assert_eq!(endpoint.path(), "me/schedules?start=2024-03-04&end=2024-03-10");
  }
}

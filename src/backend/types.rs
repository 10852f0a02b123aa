use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hackathon row. Columns not listed here are carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hackathon {
  pub id: String,
  #[serde(default)]
  pub team_id: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub reg_deadline: Option<String>,
  #[serde(default)]
  pub submission_deadline: Option<String>,
  #[serde(default)]
  pub link: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Hackathon {
  pub fn reg_deadline_at(&self) -> Option<DateTime<Utc>> {
    self.reg_deadline.as_deref().and_then(parse_timestamp)
  }

  pub fn submission_deadline_at(&self) -> Option<DateTime<Utc>> {
    self.submission_deadline.as_deref().and_then(parse_timestamp)
  }
}

/// Minimal profile joined onto tasks as `assignee`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

/// Task row with its assignee profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  #[serde(default)]
  pub team_id: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub assigned_to: Option<String>,
  #[serde(default)]
  pub deadline: Option<String>,
  #[serde(default)]
  pub assignee: Option<Profile>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Task {
  pub fn is_done(&self) -> bool {
    self.status == "done"
  }

  pub fn deadline_at(&self) -> Option<DateTime<Utc>> {
    self.deadline.as_deref().and_then(parse_timestamp)
  }
}

/// Parse the timestamp shapes the backend emits.
///
/// Accepts RFC 3339, naive date-times (taken as UTC) and bare dates
/// (midnight UTC). Anything else is treated as "no deadline".
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
      return Some(dt.and_utc());
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| dt.and_utc())
}

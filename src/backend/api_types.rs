//! Serde types matching backend REST responses.
//!
//! These are kept apart from the session and row types so the wire shape
//! can change without touching what gets persisted.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::{Session, SessionUser};

#[derive(Debug, Serialize)]
pub struct ApiPasswordGrant<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiRefreshGrant<'a> {
  pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub user_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTokenResponse {
  pub access_token: String,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub expires_in: Option<i64>,
  #[serde(default)]
  pub expires_at: Option<i64>,
  pub user: ApiUser,
}

impl ApiTokenResponse {
  pub fn into_session(self, now: DateTime<Utc>) -> Session {
    let expires_at = match (self.expires_at, self.expires_in) {
      (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
      (None, Some(secs)) => Some(now + Duration::seconds(secs)),
      (None, None) => None,
    };

    let name = self
      .user
      .user_metadata
      .as_ref()
      .and_then(|m| m.get("name"))
      .and_then(Value::as_str)
      .map(String::from);

    Session {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      expires_at,
      user: SessionUser {
        id: self.user.id,
        email: self.user.email,
        name,
      },
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiTeamMember {
  pub team_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiIdRow {
  #[serde(default)]
  pub id: Option<String>,
}

//! Signed-in session, persisted so it survives restarts and works offline.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
  pub id: String,
  pub email: Option<String>,
  pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expires_at: Option<DateTime<Utc>>,
  pub user: SessionUser,
}

/// Tokens this close to expiry are refreshed early.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

impl Session {
  /// Sessions without a known expiry never expire locally.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self
      .expires_at
      .is_some_and(|at| at - EXPIRY_MARGIN <= now)
  }
}

/// Sign-in and current-session operations of the auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
  /// The locally known session, if any. An expired one is refreshed first
  /// when the auth server can be reached.
  async fn current_session(&self) -> Result<Option<Session>>;

  /// Exchange credentials for a session and remember it.
  async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;
}

/// Token grants of the auth server.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
  async fn password_grant(&self, email: &str, password: &str) -> Result<Session>;

  /// `Ok(None)` when the server rejects the refresh token.
  async fn refresh_grant(&self, refresh_token: &str) -> Result<Option<Session>>;
}

/// JSON file holding the last session.
#[derive(Debug, Clone)]
pub struct SessionStore {
  path: PathBuf,
}

impl SessionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Result<Option<Session>> {
    if !self.path.exists() {
      return Ok(None);
    }

    let contents = std::fs::read_to_string(&self.path)
      .map_err(|e| eyre!("Failed to read session {}: {}", self.path.display(), e))?;

    let session = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse session {}: {}", self.path.display(), e))?;

    Ok(Some(session))
  }

  pub fn save(&self, session: &Session) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let contents = serde_json::to_string_pretty(session)
      .map_err(|e| eyre!("Failed to serialize session: {}", e))?;

    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write session {}: {}", self.path.display(), e))
  }

  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!(
        "Failed to remove session {}: {}",
        self.path.display(),
        e
      )),
    }
  }
}

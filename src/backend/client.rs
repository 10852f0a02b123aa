use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::api_types::{
  ApiIdRow, ApiPasswordGrant, ApiRefreshGrant, ApiTeamMember, ApiTokenResponse,
};
use crate::backend::session::{AuthProvider, Session, SessionStore, TokenEndpoint};
use crate::backend::types::{Hackathon, Task};
use crate::backend::Backend;
use crate::cache::DomainKey;
use crate::config::Config;
use crate::online::ReachabilityProbe;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// REST client for the hosted backend.
#[derive(Clone)]
pub struct BackendClient {
  http: reqwest::Client,
  base: Url,
  anon_key: String,
  access_token: Option<String>,
}

impl BackendClient {
  pub fn new(config: &Config) -> Result<Self> {
    let anon_key = Config::get_anon_key()?;
    Self::with_key(&config.backend.url, anon_key)
  }

  pub fn with_key(url: &str, anon_key: String) -> Result<Self> {
    let mut base = Url::parse(url).map_err(|e| eyre!("Invalid backend url {}: {}", url, e))?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      anon_key,
      access_token: None,
    })
  }

  /// Act on behalf of the signed-in user.
  pub fn with_session(mut self, session: &Session) -> Self {
    self.access_token = Some(session.access_token.clone());
    self
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
    request.header("apikey", &self.anon_key).bearer_auth(token)
  }

  async fn get_rows<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
    let response = self
      .authorize(self.http.get(url.clone()))
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url.path(), e))?
      .error_for_status()
      .map_err(|e| eyre!("Backend rejected {}: {}", url.path(), e))?;

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url.path(), e))
  }

  fn table_url(&self, table: &str, query: &[(&str, String)]) -> Result<Url> {
    let mut url = self.endpoint(&format!("rest/v1/{}", table))?;
    {
      let mut pairs = url.query_pairs_mut();
      for (name, value) in query {
        pairs.append_pair(name, value);
      }
    }
    Ok(url)
  }

  /// Offset pages need a total order or rows can repeat across pages.
  fn ids_page_url(
    &self,
    table: DomainKey,
    team_ids: &[String],
    offset: usize,
    limit: usize,
  ) -> Result<Url> {
    self.table_url(
      table.as_str(),
      &[
        ("select", "id".to_string()),
        ("team_id", in_list(team_ids)),
        ("order", "id.asc".to_string()),
        ("offset", offset.to_string()),
        ("limit", limit.to_string()),
      ],
    )
  }

  async fn token_request<B: Serialize>(&self, grant_type: &str, body: &B) -> Result<Response> {
    let mut url = self.endpoint("auth/v1/token")?;
    url.query_pairs_mut().append_pair("grant_type", grant_type);

    self
      .http
      .post(url)
      .header("apikey", &self.anon_key)
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Token request ({}) failed: {}", grant_type, e))
  }

  async fn parse_session(response: Response) -> Result<Session> {
    let token: ApiTokenResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse token response: {}", e))?;

    Ok(token.into_session(Utc::now()))
  }

  /// Password grant against the auth endpoint.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
    let response = self
      .token_request("password", &ApiPasswordGrant { email, password })
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Sign-in rejected: {}", e))?;

    Self::parse_session(response).await
  }

  /// Exchange a refresh token for a new session. A 4xx answer other than
  /// rate limiting means the token is no longer valid and yields `None`.
  pub async fn refresh(&self, refresh_token: &str) -> Result<Option<Session>> {
    let response = self
      .token_request("refresh_token", &ApiRefreshGrant { refresh_token })
      .await?;

    let status = response.status();
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
      debug!(status = %status, "refresh token rejected");
      return Ok(None);
    }

    let response = response
      .error_for_status()
      .map_err(|e| eyre!("Session refresh failed: {}", e))?;

    Self::parse_session(response).await.map(Some)
  }
}

#[async_trait]
impl TokenEndpoint for BackendClient {
  async fn password_grant(&self, email: &str, password: &str) -> Result<Session> {
    self.sign_in(email, password).await
  }

  async fn refresh_grant(&self, refresh_token: &str) -> Result<Option<Session>> {
    self.refresh(refresh_token).await
  }
}

/// `in.(a,b,c)` filter value.
fn in_list(ids: &[String]) -> String {
  format!("in.({})", ids.join(","))
}

#[async_trait]
impl Backend for BackendClient {
  async fn team_ids(&self, user_id: &str) -> Result<Vec<String>> {
    let url = self.table_url(
      "team_members",
      &[
        ("select", "team_id".to_string()),
        ("user_id", format!("eq.{}", user_id)),
      ],
    )?;
    let rows: Vec<ApiTeamMember> = self.get_rows(url).await?;
    Ok(rows.into_iter().map(|r| r.team_id).collect())
  }

  async fn hackathons(&self, team_ids: &[String]) -> Result<Vec<Hackathon>> {
    let url = self.table_url(
      "hackathons",
      &[
        ("select", "*".to_string()),
        ("team_id", in_list(team_ids)),
        ("order", "submission_deadline.asc".to_string()),
      ],
    )?;
    self.get_rows(url).await
  }

  async fn tasks(&self, team_ids: &[String]) -> Result<Vec<Task>> {
    let url = self.table_url(
      "tasks",
      &[
        (
          "select",
          "*,assignee:assigned_to(id,name,email)".to_string(),
        ),
        ("team_id", in_list(team_ids)),
        ("order", "deadline.asc".to_string()),
      ],
    )?;
    self.get_rows(url).await
  }

  async fn ids_page(
    &self,
    table: DomainKey,
    team_ids: &[String],
    offset: usize,
    limit: usize,
  ) -> Result<Vec<String>> {
    let url = self.ids_page_url(table, team_ids, offset, limit)?;
    let rows: Vec<ApiIdRow> = self.get_rows(url).await?;
    Ok(rows.into_iter().filter_map(|r| r.id).collect())
  }
}

#[async_trait]
impl ReachabilityProbe for BackendClient {
  async fn is_reachable(&self) -> bool {
    let Ok(url) = self.endpoint("auth/v1/health") else {
      return false;
    };
    // Any HTTP answer at all means the network path works
    self
      .http
      .get(url)
      .header("apikey", &self.anon_key)
      .timeout(PROBE_TIMEOUT)
      .send()
      .await
      .is_ok()
  }
}

/// Auth provider backed by the password grant and a local session file.
pub struct PasswordAuth<T = BackendClient> {
  tokens: T,
  store: SessionStore,
}

impl<T: TokenEndpoint> PasswordAuth<T> {
  pub fn new(tokens: T, store: SessionStore) -> Self {
    Self { tokens, store }
  }
}

#[async_trait]
impl<T: TokenEndpoint> AuthProvider for PasswordAuth<T> {
  async fn current_session(&self) -> Result<Option<Session>> {
    let Some(session) = self.store.load()? else {
      return Ok(None);
    };
    if !session.is_expired(Utc::now()) {
      return Ok(Some(session));
    }

    let Some(refresh_token) = session.refresh_token.as_deref() else {
      info!("session expired, sign in again");
      self.store.clear()?;
      return Ok(None);
    };

    match self.tokens.refresh_grant(refresh_token).await {
      Ok(Some(fresh)) => {
        self.store.save(&fresh)?;
        debug!(user = %fresh.user.id, "session refreshed");
        Ok(Some(fresh))
      }
      Ok(None) => {
        info!("refresh token rejected, sign in again");
        self.store.clear()?;
        Ok(None)
      }
      // Offline: cached screens are still keyed by this user
      Err(e) => {
        warn!(error = %e, "session refresh failed, keeping expired session");
        Ok(Some(session))
      }
    }
  }

  async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
    let session = self.tokens.password_grant(email, password).await?;
    self.store.save(&session)?;
    Ok(session)
  }
}

//! In-process fakes shared by the unit tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::backend::{AuthProvider, Backend, Hackathon, Session, SessionUser, Task};
use crate::cache::{CacheStorage, DomainKey};
use crate::worker::{
  Credentials, HttpResponse, MemoryResponseStore, Network, ResponseStore, WorkerRequest,
};

/// Storage whose every call fails.
pub struct BrokenStorage;

impl CacheStorage for BrokenStorage {
  fn get(&self, _key: &str) -> Result<Option<String>> {
    Err(eyre!("storage unavailable"))
  }

  fn set(&self, _key: &str, _payload: &str) -> Result<()> {
    Err(eyre!("quota exceeded"))
  }
}

pub struct FakeAuth {
  session: Option<Session>,
}

impl FakeAuth {
  pub fn signed_in(user_id: &str) -> Self {
    Self {
      session: Some(session_for(user_id)),
    }
  }

  pub fn signed_out() -> Self {
    Self { session: None }
  }
}

fn session_for(user_id: &str) -> Session {
  Session {
    access_token: format!("token-{}", user_id),
    refresh_token: None,
    expires_at: None,
    user: SessionUser {
      id: user_id.to_string(),
      email: Some(format!("{}@example.com", user_id)),
      name: None,
    },
  }
}

#[async_trait]
impl AuthProvider for FakeAuth {
  async fn current_session(&self) -> Result<Option<Session>> {
    Ok(self.session.clone())
  }

  async fn sign_in(&self, email: &str, _password: &str) -> Result<Session> {
    match email.split('@').next() {
      Some(user) if !user.is_empty() => Ok(session_for(user)),
      _ => Err(eyre!("invalid credentials")),
    }
  }
}

/// Scripted backend. Id pages are generated as `<table>-<n>`.
#[derive(Default)]
pub struct FakeBackend {
  teams: Vec<String>,
  hackathons: Vec<Hackathon>,
  tasks: Vec<Task>,
  task_ids: usize,
  hackathon_ids: usize,
  unreachable: bool,
  failing: AtomicBool,
  failing_pages_from: Option<usize>,
  collection_queries: AtomicUsize,
  task_pages: AtomicUsize,
  hackathon_pages: AtomicUsize,
}

impl FakeBackend {
  pub fn with_teams(mut self, teams: &[&str]) -> Self {
    self.teams = teams.iter().map(|t| t.to_string()).collect();
    self
  }

  pub fn with_hackathons(mut self, hackathons: Vec<Hackathon>) -> Self {
    self.hackathons = hackathons;
    self
  }

  pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
    self.tasks = tasks;
    self
  }

  pub fn with_task_ids(mut self, count: usize) -> Self {
    self.task_ids = count;
    self
  }

  pub fn with_hackathon_ids(mut self, count: usize) -> Self {
    self.hackathon_ids = count;
    self
  }

  /// Collection queries fail; team lookup still works.
  pub fn failing(self) -> Self {
    self.set_failing(true);
    self
  }

  /// Team lookup fails.
  pub fn unreachable(mut self) -> Self {
    self.unreachable = true;
    self
  }

  /// Id pages starting at or after `offset` fail.
  pub fn failing_pages_from(mut self, offset: usize) -> Self {
    self.failing_pages_from = Some(offset);
    self
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Hackathon and task queries attempted so far.
  pub fn collection_queries(&self) -> usize {
    self.collection_queries.load(Ordering::SeqCst)
  }

  pub fn page_requests(&self, table: DomainKey) -> usize {
    match table {
      DomainKey::Tasks => self.task_pages.load(Ordering::SeqCst),
      DomainKey::Hackathons => self.hackathon_pages.load(Ordering::SeqCst),
    }
  }

  fn collection<T: Clone>(&self, rows: &[T]) -> Result<Vec<T>> {
    self.collection_queries.fetch_add(1, Ordering::SeqCst);
    if self.failing.load(Ordering::SeqCst) {
      return Err(eyre!("connection refused"));
    }
    Ok(rows.to_vec())
  }
}

#[async_trait]
impl Backend for FakeBackend {
  async fn team_ids(&self, _user_id: &str) -> Result<Vec<String>> {
    if self.unreachable {
      return Err(eyre!("network unreachable"));
    }
    Ok(self.teams.clone())
  }

  async fn hackathons(&self, _team_ids: &[String]) -> Result<Vec<Hackathon>> {
    self.collection(&self.hackathons)
  }

  async fn tasks(&self, _team_ids: &[String]) -> Result<Vec<Task>> {
    self.collection(&self.tasks)
  }

  async fn ids_page(
    &self,
    table: DomainKey,
    _team_ids: &[String],
    offset: usize,
    limit: usize,
  ) -> Result<Vec<String>> {
    let total = match table {
      DomainKey::Tasks => {
        self.task_pages.fetch_add(1, Ordering::SeqCst);
        self.task_ids
      }
      DomainKey::Hackathons => {
        self.hackathon_pages.fetch_add(1, Ordering::SeqCst);
        self.hackathon_ids
      }
    };

    if self.failing_pages_from.is_some_and(|from| offset >= from) {
      return Err(eyre!("page at {} failed", offset));
    }

    let end = total.min(offset + limit);
    Ok((offset..end).map(|n| format!("{}-{}", table, n)).collect())
  }
}

/// Scripted network. Unknown URLs answer 404; offline means no response.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, HttpResponse>>,
  offline: AtomicBool,
  calls: Mutex<Vec<(String, Credentials)>>,
}

impl FakeNetwork {
  pub fn serve(&self, url: &Url, response: HttpResponse) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn reset_calls(&self) {
    self.calls.lock().unwrap().clear();
  }

  pub fn calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls_to(&self, url: &Url) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(called, _)| called == url.as_str())
      .count()
  }

  pub fn saw_credentials(&self, url: &Url) -> bool {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .any(|(called, credentials)| called == url.as_str() && *credentials == Credentials::Include)
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &WorkerRequest, credentials: Credentials) -> Result<HttpResponse> {
    self
      .calls
      .lock()
      .unwrap()
      .push((request.url.to_string(), credentials));

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("offline"));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .unwrap_or_else(|| HttpResponse::new(404, "not found")),
    )
  }
}

/// Response store that accepts a fixed number of writes, then fails them.
pub struct FlakyResponseStore {
  inner: MemoryResponseStore,
  writes_left: AtomicUsize,
}

impl FlakyResponseStore {
  pub fn failing_after(writes: usize) -> Self {
    Self {
      inner: MemoryResponseStore::new(),
      writes_left: AtomicUsize::new(writes),
    }
  }

  pub fn heal(&self) {
    self.writes_left.store(usize::MAX, Ordering::SeqCst);
  }
}

impl ResponseStore for FlakyResponseStore {
  fn get(&self, generation: &str, url: &str) -> Result<Option<HttpResponse>> {
    self.inner.get(generation, url)
  }

  fn put(&self, generation: &str, url: &str, response: &HttpResponse) -> Result<()> {
    let allowed = self
      .writes_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if !allowed {
      return Err(eyre!("disk full"));
    }
    self.inner.put(generation, url, response)
  }

  fn generations(&self) -> Result<Vec<String>> {
    self.inner.generations()
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    self.inner.delete(generation)
  }
}

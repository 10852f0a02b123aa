//! Data loaders for the dashboard, hackathon list and task list screens.
//!
//! Each load resolves the signed-in user's teams, runs the authoritative
//! query and writes the result through to the local cache. Any failure
//! along the way is answered from the cache instead of being reported.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{AuthProvider, Backend, Hackathon, SessionUser, Task};
use crate::cache::{CacheStorage, DomainKey, Fetched, Freshness, LocalCache};

/// What a screen load produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen<T> {
  /// The user belongs to no team yet; nothing was fetched
  NoTeam,
  /// Data, fresh or from the cache
  Ready(Fetched<T>),
}

/// Both collections shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardData {
  pub user: Option<SessionUser>,
  pub hackathons: Vec<Hackathon>,
  pub tasks: Vec<Task>,
}

/// Loads screen data for the signed-in user.
pub struct ScreenLoader<S: CacheStorage> {
  backend: Arc<dyn Backend>,
  auth: Arc<dyn AuthProvider>,
  cache: LocalCache<S>,
}

impl<S: CacheStorage> Clone for ScreenLoader<S> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      auth: Arc::clone(&self.auth),
      cache: self.cache.clone(),
    }
  }
}

/// Team lookup outcome.
enum Teams {
  NoTeam,
  Member(Vec<String>),
  Unreachable,
}

impl<S: CacheStorage> ScreenLoader<S> {
  pub fn new(backend: Arc<dyn Backend>, auth: Arc<dyn AuthProvider>, cache: LocalCache<S>) -> Self {
    Self {
      backend,
      auth,
      cache,
    }
  }

  /// The signed-in user. This is the only failure a screen load reports.
  pub async fn current_user(&self) -> Result<SessionUser> {
    self
      .auth
      .current_session()
      .await?
      .map(|session| session.user)
      .ok_or_else(|| eyre!("Not signed in. Run `hacknotify login` first."))
  }

  async fn teams(&self, user_id: &str) -> Teams {
    match self.backend.team_ids(user_id).await {
      Ok(teams) if teams.is_empty() => Teams::NoTeam,
      Ok(teams) => Teams::Member(teams),
      Err(e) => {
        warn!(error = %e, "team lookup failed");
        Teams::Unreachable
      }
    }
  }

  async fn load_collection<T, F, Fut>(&self, key: DomainKey, query: F) -> Result<Screen<T>>
  where
    T: Serialize + DeserializeOwned + Default,
    F: FnOnce(Arc<dyn Backend>, Vec<String>) -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let user = self.current_user().await?;

    let teams = match self.teams(&user.id).await {
      Teams::NoTeam => return Ok(Screen::NoTeam),
      Teams::Member(teams) => teams,
      Teams::Unreachable => return Ok(Screen::Ready(self.cache.fallback(&user.id, key))),
    };

    let backend = Arc::clone(&self.backend);
    let fetched = self
      .cache
      .fetch_or_fallback(&user.id, key, || query(backend, teams))
      .await;
    debug!(domain = %key, stale = fetched.freshness.is_stale(), "screen loaded");
    Ok(Screen::Ready(fetched))
  }

  /// Hackathon list screen.
  pub async fn hackathons(&self) -> Result<Screen<Vec<Hackathon>>> {
    self
      .load_collection(DomainKey::Hackathons, |backend, teams| async move {
        backend.hackathons(&teams).await
      })
      .await
  }

  /// Task list screen.
  pub async fn tasks(&self) -> Result<Screen<Vec<Task>>> {
    self
      .load_collection(DomainKey::Tasks, |backend, teams| async move {
        backend.tasks(&teams).await
      })
      .await
  }

  /// Dashboard: hackathons and tasks together, falling back as a pair.
  pub async fn dashboard(&self) -> Result<Screen<DashboardData>> {
    let user = self.current_user().await?;

    let fresh = match self.teams(&user.id).await {
      Teams::NoTeam => return Ok(Screen::NoTeam),
      Teams::Member(teams) => self.fetch_dashboard(&teams).await,
      Teams::Unreachable => Err(eyre!("team lookup failed")),
    };

    let fetched = match fresh {
      Ok((hackathons, tasks)) => {
        self.cache.write(&user.id, DomainKey::Hackathons, &hackathons);
        self.cache.write(&user.id, DomainKey::Tasks, &tasks);
        Fetched::from_network(DashboardData {
          user: Some(user),
          hackathons,
          tasks,
        })
      }
      Err(e) => {
        warn!(error = %e, "dashboard fetch failed, falling back to cache");
        let hackathons = self
          .cache
          .read::<Vec<Hackathon>>(&user.id, DomainKey::Hackathons)
          .into_entry();
        let tasks = self
          .cache
          .read::<Vec<Task>>(&user.id, DomainKey::Tasks)
          .into_entry();

        let saved_at = hackathons
          .as_ref()
          .map(|e| e.saved_at)
          .or_else(|| tasks.as_ref().map(|e| e.saved_at));

        Fetched {
          data: DashboardData {
            user: Some(user),
            hackathons: hackathons.map(|e| e.value).unwrap_or_default(),
            tasks: tasks.map(|e| e.value).unwrap_or_default(),
          },
          freshness: saved_at.map_or(Freshness::NoCache, Freshness::Cached),
        }
      }
    };

    Ok(Screen::Ready(fetched))
  }

  async fn fetch_dashboard(&self, teams: &[String]) -> Result<(Vec<Hackathon>, Vec<Task>)> {
    let hackathons = self.backend.hackathons(teams).await?;
    let tasks = self.backend.tasks(teams).await?;
    Ok((hackathons, tasks))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::testing::{FakeAuth, FakeBackend};
  use crate::views::urgent_deadlines;
  use chrono::{Duration, Utc};

  fn loader(backend: &Arc<FakeBackend>) -> ScreenLoader<MemoryStorage> {
    ScreenLoader::new(
      backend.clone(),
      Arc::new(FakeAuth::signed_in("me")),
      LocalCache::new(MemoryStorage::new()),
    )
  }

  fn hackathon(id: &str, days: i64) -> Hackathon {
    Hackathon {
      id: id.to_string(),
      team_id: Some("team-1".to_string()),
      submission_deadline: Some((Utc::now() + Duration::days(days)).to_rfc3339()),
      ..Default::default()
    }
  }

  fn task(id: &str) -> Task {
    Task {
      id: id.to_string(),
      status: "todo".to_string(),
      assigned_to: Some("me".to_string()),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_no_team_skips_collection_queries() {
    let backend = Arc::new(FakeBackend::default());
    let loader = loader(&backend);

    assert_eq!(loader.dashboard().await.unwrap(), Screen::NoTeam);
    assert_eq!(loader.tasks().await.unwrap(), Screen::NoTeam);
    assert_eq!(backend.collection_queries(), 0);
  }

  #[tokio::test]
  async fn test_not_signed_in_is_an_error() {
    let backend = Arc::new(FakeBackend::default());
    let loader = ScreenLoader::new(
      backend,
      Arc::new(FakeAuth::signed_out()),
      LocalCache::new(MemoryStorage::new()),
    );
    assert!(loader.dashboard().await.is_err());
  }

  #[tokio::test]
  async fn test_online_dashboard_updates_cache_and_urgent_view() {
    let backend = Arc::new(
      FakeBackend::default()
        .with_teams(&["team-1"])
        .with_hackathons(vec![
          hackathon("soon", 2),
          hackathon("later", 20),
          hackathon("much-later", 40),
        ]),
    );
    let loader = loader(&backend);

    let Screen::Ready(fetched) = loader.dashboard().await.unwrap() else {
      panic!("expected data");
    };
    assert_eq!(fetched.freshness, Freshness::Network);

    let urgent: Vec<&str> = urgent_deadlines(&fetched.data.hackathons, Utc::now())
      .iter()
      .map(|h| h.id.as_str())
      .collect();
    assert_eq!(urgent, vec!["soon"]);

    let cached = loader
      .cache
      .read::<Vec<Hackathon>>("me", DomainKey::Hackathons)
      .into_entry()
      .unwrap();
    assert_eq!(cached.value.len(), 3);
  }

  #[tokio::test]
  async fn test_failed_fetch_renders_two_hour_old_tasks() {
    let backend = Arc::new(FakeBackend::default().with_teams(&["team-1"]).failing());
    let loader = loader(&backend);
    let saved_at = Utc::now() - Duration::hours(2);
    loader
      .cache
      .write_at("me", DomainKey::Tasks, &vec![task("a"), task("b")], saved_at);

    let Screen::Ready(fetched) = loader.tasks().await.unwrap() else {
      panic!("expected data");
    };
    assert_eq!(fetched.data.len(), 2);
    assert_eq!(fetched.freshness, Freshness::Cached(saved_at));
    assert_eq!(
      fetched.freshness.notice(),
      Some(format!(
        "Offline • showing cached data from {}",
        saved_at.to_rfc3339()
      ))
    );
  }

  #[tokio::test]
  async fn test_failed_fetch_without_cache_is_empty() {
    let backend = Arc::new(FakeBackend::default().with_teams(&["team-1"]).failing());
    let loader = loader(&backend);

    let Screen::Ready(fetched) = loader.hackathons().await.unwrap() else {
      panic!("expected data");
    };
    assert!(fetched.data.is_empty());
    assert_eq!(fetched.freshness, Freshness::NoCache);
  }

  #[tokio::test]
  async fn test_unreachable_team_lookup_falls_back() {
    let backend = Arc::new(FakeBackend::default().unreachable());
    let loader = loader(&backend);
    let saved_at = Utc::now() - Duration::minutes(30);
    loader
      .cache
      .write_at("me", DomainKey::Hackathons, &vec![hackathon("h", 3)], saved_at);

    let Screen::Ready(fetched) = loader.dashboard().await.unwrap() else {
      panic!("expected data, not onboarding");
    };
    assert_eq!(fetched.data.hackathons.len(), 1);
    assert!(fetched.data.tasks.is_empty());
    assert_eq!(fetched.freshness, Freshness::Cached(saved_at));
  }

  #[tokio::test]
  async fn test_success_after_fallback_clears_annotation() {
    let backend = Arc::new(FakeBackend::default().with_teams(&["team-1"]).failing());
    let loader = loader(&backend);
    let Screen::Ready(first) = loader.tasks().await.unwrap() else {
      panic!("expected data");
    };
    assert!(first.freshness.is_stale());

    backend.set_failing(false);
    let Screen::Ready(second) = loader.tasks().await.unwrap() else {
      panic!("expected data");
    };
    assert_eq!(second.freshness.notice(), None);
  }
}

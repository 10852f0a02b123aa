//! Async fetch cycle with offline-aware states.
//!
//! A `Query<T>` wraps a screen loader and tracks one fetch cycle at a time:
//! `Idle -> Loading -> {Success, Fallback}`. A cycle that falls back to the
//! local cache is a valid outcome, not an error.
//!
//! ```ignore
//! let mut query = Query::new(move || {
//!   let loader = loader.clone();
//!   async move { loader.tasks().await.map_err(|e| e.to_string()) }
//! });
//! query.fetch();
//! query.settle().await;
//! render(query.state());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::screens::Screen;

/// Where a screen load currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  Idle,
  Loading,
  /// Fresh data from the backend
  Success(T),
  /// Backend unreachable; data comes from the local cache (possibly empty)
  Fallback { data: T, notice: String },
  /// The user has no team yet
  NoTeam,
  /// The load could not even start (e.g. nobody is signed in)
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_fallback(&self) -> bool {
    matches!(self, QueryState::Fallback { .. })
  }

  /// Data to render, fresh or cached.
  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) | QueryState::Fallback { data, .. } => Some(data),
      _ => None,
    }
  }

  /// Staleness notice to show next to the data.
  pub fn notice(&self) -> Option<&str> {
    match self {
      QueryState::Fallback { notice, .. } => Some(notice),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }

  fn from_screen(screen: Screen<T>) -> Self {
    match screen {
      Screen::NoTeam => QueryState::NoTeam,
      Screen::Ready(fetched) => match fetched.freshness.notice() {
        Some(notice) => QueryState::Fallback {
          data: fetched.data,
          notice,
        },
        None => QueryState::Success(fetched.data),
      },
    }
  }
}

type LoadResult<T> = Result<Screen<T>, String>;
type Loader<T> = Box<dyn Fn() -> Pin<Box<dyn Future<Output = LoadResult<T>> + Send>> + Send + Sync>;

/// One screen's load cycle, driven from a render loop or awaited directly.
///
/// Each cycle runs on its own task and reports back over a oneshot. Replacing
/// the receiver is how a cycle is abandoned: the task still finishes, and
/// its result goes nowhere.
pub struct Query<T> {
  state: QueryState<T>,
  loader: Loader<T>,
  pending: Option<oneshot::Receiver<LoadResult<T>>>,
  fetched_at: Option<Instant>,
}

impl<T: Send + 'static> Query<T> {
  /// `loader` is invoked once per cycle.
  pub fn new<F, Fut>(loader: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      loader: Box::new(move || Box::pin(loader())),
      pending: None,
      fetched_at: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// When the last cycle finished.
  pub fn fetched_at(&self) -> Option<Instant> {
    self.fetched_at
  }

  /// Begin a cycle unless one is already running.
  pub fn fetch(&mut self) {
    if !self.state.is_loading() {
      self.begin();
    }
  }

  /// Begin a new cycle now. A running one is abandoned, not aborted.
  pub fn refetch(&mut self) {
    self.begin();
  }

  /// Non-blocking check for the running cycle's result.
  /// Returns `true` when the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = self.pending.as_mut() else {
      return false;
    };

    let result = match pending.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return false,
      Err(oneshot::error::TryRecvError::Closed) => Err(CANCELLED.to_string()),
    };
    self.finish(result);
    true
  }

  /// Wait for the running cycle. Returns `false` if nothing was running.
  pub async fn settle(&mut self) -> bool {
    let Some(pending) = self.pending.as_mut() else {
      return false;
    };

    let result = pending.await.unwrap_or_else(|_| Err(CANCELLED.to_string()));
    self.finish(result);
    true
  }

  fn begin(&mut self) {
    let (tx, rx) = oneshot::channel();
    self.pending = Some(rx);
    self.state = QueryState::Loading;

    let load = (self.loader)();
    tokio::spawn(async move {
      // Nobody listening means the cycle was abandoned
      let _ = tx.send(load.await);
    });
  }

  fn finish(&mut self, result: LoadResult<T>) {
    self.pending = None;
    self.state = match result {
      Ok(screen) => {
        self.fetched_at = Some(Instant::now());
        QueryState::from_screen(screen)
      }
      Err(error) => QueryState::Error(error),
    };
  }
}

const CANCELLED: &str = "load cancelled";

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("pending", &self.pending.is_some())
      .finish_non_exhaustive()
  }
}

//! Background request interceptor for the application shell.
//!
//! The worker owns a versioned response cache and answers intercepted
//! requests from it according to [`policy::classify`]:
//! - static build assets are cache-first,
//! - navigations are stale-while-revalidate with an offline document fallback,
//! - other GETs are cache-first with write-through,
//! - everything else passes through.
//!
//! Lifecycle: `install` fills the current generation with the shell
//! manifest (all or nothing), `activate` takes control and deletes every
//! other generation. Precache commands arrive over [`WorkerHandle`].

pub mod message;
pub mod network;
pub mod policy;
pub mod store;

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;

pub use message::{WorkerHandle, WorkerMessage};
pub use network::{Credentials, HttpNetwork, HttpResponse, Network};
pub use policy::{classify, Policy, RequestMode, WorkerRequest};
pub use store::{MemoryResponseStore, ResponseStore, SqliteResponseStore};

/// Worker lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Not installed; requests pass through
  Parsed,
  /// Shell manifest cached, not yet in control
  Installed,
  /// In control of all clients
  Activated,
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Cache,
  Network,
  OfflineDocument,
}

/// Result of offering a request to the worker.
#[derive(Debug)]
pub enum FetchOutcome {
  /// The worker did not intercept; the caller goes to the network itself
  PassThrough,
  Responded {
    response: HttpResponse,
    source: ResponseSource,
    /// Background refresh started for a stale-while-revalidate hit
    revalidation: Option<JoinHandle<()>>,
  },
}

/// Outcome of a precache command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheReport {
  pub stored: usize,
  pub failed: Vec<String>,
}

struct Inner {
  config: WorkerConfig,
  origin: Url,
  store: Arc<dyn ResponseStore>,
  network: Arc<dyn Network>,
  lifecycle: Mutex<Lifecycle>,
}

/// The service worker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ServiceWorker {
  inner: Arc<Inner>,
}

impl ServiceWorker {
  pub fn new(
    config: WorkerConfig,
    origin: Url,
    store: Arc<dyn ResponseStore>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        config,
        origin,
        store,
        network,
        lifecycle: Mutex::new(Lifecycle::Parsed),
      }),
    }
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self
      .inner
      .lifecycle
      .lock()
      .map(|l| *l)
      .unwrap_or(Lifecycle::Parsed)
  }

  fn set_lifecycle(&self, next: Lifecycle) {
    if let Ok(mut lifecycle) = self.inner.lifecycle.lock() {
      *lifecycle = next;
    }
  }

  /// Name of the generation this worker reads and writes.
  pub fn generation(&self) -> &str {
    &self.inner.config.cache_name
  }

  /// Every generation currently in the response store.
  pub fn generations(&self) -> Result<Vec<String>> {
    self.inner.store.generations()
  }

  /// Resolve an app-relative path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .inner
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid url {}: {}", path, e))
  }

  /// Bring the worker into control: reuse a complete install of the
  /// current generation, or install and activate from scratch.
  pub async fn start(&self) -> Result<()> {
    if self.is_installed()? {
      debug!(generation = self.generation(), "resuming installed worker");
      self.activate()?;
      return Ok(());
    }

    self.install().await?;
    self.activate()?;
    Ok(())
  }

  /// Cache every shell asset in the current generation.
  ///
  /// All assets are fetched before anything is stored; a single failure
  /// (no response, or a non-2xx status) fails the install and stores nothing.
  pub async fn install(&self) -> Result<()> {
    let assets = &self.inner.config.shell_assets;
    info!(generation = self.generation(), count = assets.len(), "installing");

    let requests = assets
      .iter()
      .map(|path| self.resolve(path).map(WorkerRequest::get))
      .collect::<Result<Vec<_>>>()?;

    let responses = try_join_all(requests.iter().map(|request| async move {
      let response = self
        .inner
        .network
        .fetch(request, self.credentials_for(request))
        .await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Shell asset {} returned status {}",
          request.url,
          response.status
        ));
      }
      Ok(response)
    }))
    .await
    .map_err(|e| eyre!("Install failed: {}", e))?;

    for (request, response) in requests.iter().zip(&responses) {
      if let Err(e) = self
        .inner
        .store
        .put(self.generation(), &request.cache_key(), response)
      {
        // A partial generation would pass for an install on the next start
        if let Err(cleanup) = self.inner.store.delete(self.generation()) {
          warn!(error = %cleanup, "failed to drop partial install");
        }
        return Err(eyre!("Install failed storing {}: {}", request.url, e));
      }
    }

    // Skip waiting: an installed worker is ready to activate immediately
    self.set_lifecycle(Lifecycle::Installed);
    Ok(())
  }

  /// Whether every shell asset is stored in the current generation.
  pub fn is_installed(&self) -> Result<bool> {
    for path in &self.inner.config.shell_assets {
      let key = WorkerRequest::get(self.resolve(path)?).cache_key();
      if self.inner.store.get(self.generation(), &key)?.is_none() {
        return Ok(false);
      }
    }
    Ok(true)
  }

  /// Take control and delete every generation but the current one.
  /// Returns the names of the deleted generations.
  pub fn activate(&self) -> Result<Vec<String>> {
    self.set_lifecycle(Lifecycle::Activated);

    let mut deleted = Vec::new();
    for generation in self.inner.store.generations()? {
      if generation != self.generation() {
        self.inner.store.delete(&generation)?;
        deleted.push(generation);
      }
    }

    info!(generation = self.generation(), ?deleted, "activated");
    Ok(deleted)
  }

  /// Process one application message.
  pub async fn handle_message(&self, message: WorkerMessage) -> PrecacheReport {
    match message {
      WorkerMessage::PrecacheUrls { urls } => self.precache(&urls).await,
    }
  }

  /// Serve messages until every [`WorkerHandle`] is dropped.
  pub fn listen(&self, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) -> JoinHandle<()> {
    let worker = self.clone();
    tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        worker.handle_message(message).await;
      }
      debug!("worker message channel closed");
    })
  }

  /// Fetch each URL with credentials and store the ok ones.
  /// Failures are isolated per URL.
  pub async fn precache(&self, urls: &[String]) -> PrecacheReport {
    let results = join_all(urls.iter().map(|raw| async move {
      let url = self.resolve(raw)?;
      let request = WorkerRequest::get(url);
      let response = self
        .inner
        .network
        .fetch(&request, Credentials::Include)
        .await?;
      if !response.is_ok() {
        return Err(eyre!("status {}", response.status));
      }
      self
        .inner
        .store
        .put(self.generation(), &request.cache_key(), &response)
    }))
    .await;

    let mut report = PrecacheReport::default();
    for (raw, result) in urls.iter().zip(results) {
      match result {
        Ok(()) => report.stored += 1,
        Err(e) => {
          debug!(url = %raw, error = %e, "precache skipped url");
          report.failed.push(raw.clone());
        }
      }
    }

    info!(
      stored = report.stored,
      failed = report.failed.len(),
      "precache batch done"
    );
    report
  }

  /// Offer an intercepted request to the worker.
  ///
  /// `Err` means the request could not be answered at all (no cached copy
  /// and no network, and for navigations no offline document either).
  pub async fn handle_fetch(&self, request: WorkerRequest) -> Result<FetchOutcome> {
    if self.lifecycle() != Lifecycle::Activated {
      return Ok(FetchOutcome::PassThrough);
    }

    match classify(&request, &self.inner.config.static_prefix) {
      Policy::PassThrough => Ok(FetchOutcome::PassThrough),
      Policy::StaticAsset | Policy::Other => self.cache_first(request).await,
      Policy::Navigation => self.stale_while_revalidate(request).await,
    }
  }

  /// Like [`handle_fetch`](Self::handle_fetch) but performs pass-through
  /// requests too, so the caller always gets a response.
  pub async fn respond(&self, request: WorkerRequest) -> Result<(HttpResponse, ResponseSource)> {
    match self.handle_fetch(request.clone()).await? {
      FetchOutcome::Responded {
        response, source, ..
      } => Ok((response, source)),
      FetchOutcome::PassThrough => {
        let response = self
          .inner
          .network
          .fetch(&request, self.credentials_for(&request))
          .await?;
        Ok((response, ResponseSource::Network))
      }
    }
  }

  async fn cache_first(&self, request: WorkerRequest) -> Result<FetchOutcome> {
    let key = request.cache_key();
    if let Some(response) = self.cached(&key) {
      return Ok(FetchOutcome::Responded {
        response,
        source: ResponseSource::Cache,
        revalidation: None,
      });
    }

    let response = self
      .inner
      .network
      .fetch(&request, self.credentials_for(&request))
      .await?;
    self.remember(&key, &response);

    Ok(FetchOutcome::Responded {
      response,
      source: ResponseSource::Network,
      revalidation: None,
    })
  }

  async fn stale_while_revalidate(&self, request: WorkerRequest) -> Result<FetchOutcome> {
    let key = request.cache_key();

    if let Some(response) = self.cached(&key) {
      let worker = self.clone();
      let revalidation = tokio::spawn(async move {
        let credentials = worker.credentials_for(&request);
        match worker.inner.network.fetch(&request, credentials).await {
          Ok(fresh) => worker.remember(&key, &fresh),
          Err(e) => debug!(url = %key, error = %e, "background refresh failed"),
        }
      });

      return Ok(FetchOutcome::Responded {
        response,
        source: ResponseSource::Cache,
        revalidation: Some(revalidation),
      });
    }

    match self
      .inner
      .network
      .fetch(&request, self.credentials_for(&request))
      .await
    {
      Ok(response) => {
        self.remember(&key, &response);
        Ok(FetchOutcome::Responded {
          response,
          source: ResponseSource::Network,
          revalidation: None,
        })
      }
      Err(e) => {
        let offline = self.resolve(&self.inner.config.offline_document)?;
        match self.cached(offline.as_str()) {
          Some(response) => {
            warn!(url = %key, error = %e, "navigation offline, serving offline document");
            Ok(FetchOutcome::Responded {
              response,
              source: ResponseSource::OfflineDocument,
              revalidation: None,
            })
          }
          None => Err(eyre!("{} unreachable and no offline document cached: {}", key, e)),
        }
      }
    }
  }

  /// Same-origin requests carry the user's credentials.
  fn credentials_for(&self, request: &WorkerRequest) -> Credentials {
    if request.url.origin() == self.inner.origin.origin() {
      Credentials::Include
    } else {
      Credentials::Omit
    }
  }

  /// Cached copy in the current generation. Storage errors count as a miss.
  fn cached(&self, key: &str) -> Option<HttpResponse> {
    match self.inner.store.get(self.generation(), key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(url = %key, error = %e, "response cache read failed");
        None
      }
    }
  }

  /// Store a successful response; anything else is left alone.
  fn remember(&self, key: &str, response: &HttpResponse) {
    if !response.is_ok() {
      return;
    }
    if let Err(e) = self.inner.store.put(self.generation(), key, response) {
      warn!(url = %key, error = %e, "response cache write dropped");
    }
  }
}

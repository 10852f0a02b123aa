//! Cache layer that orchestrates the local cache with network fetching.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheEntry, CacheRead, CacheWrite, DomainKey, Fetched};

/// Default namespace for local cache keys.
pub const DEFAULT_PREFIX: &str = "hacktrackr.offline.v1";

/// Per-user store of last-known-good collections.
///
/// Every operation is best-effort: storage failures are logged and reported
/// through [`CacheRead`] / [`CacheWrite`], never as errors.
pub struct LocalCache<S: CacheStorage> {
  storage: Arc<S>,
  prefix: String,
}

impl<S: CacheStorage> LocalCache<S> {
  /// Create a new local cache with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      prefix: DEFAULT_PREFIX.to_string(),
    }
  }

  /// Set the key namespace.
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }

  /// Storage key for a (user, domain) pair: `<prefix>.<user_id>.<domain_key>`.
  pub fn key_for(&self, user_id: &str, key: DomainKey) -> String {
    format!("{}.{}.{}", self.prefix, user_id, key)
  }

  /// Save `value` as the latest copy, stamped with the current time.
  pub fn write<T: Serialize>(&self, user_id: &str, key: DomainKey, value: &T) -> CacheWrite {
    self.write_at(user_id, key, value, Utc::now())
  }

  /// Save `value` stamped with an explicit instant.
  pub fn write_at<T: Serialize>(
    &self,
    user_id: &str,
    key: DomainKey,
    value: &T,
    saved_at: DateTime<Utc>,
  ) -> CacheWrite {
    let storage_key = self.key_for(user_id, key);
    let entry = CacheEntry { saved_at, value };

    let payload = match serde_json::to_string(&entry) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(key = %storage_key, error = %e, "failed to serialize cache entry");
        return CacheWrite::Failed(e.to_string());
      }
    };

    match self.storage.set(&storage_key, &payload) {
      Ok(()) => {
        debug!(key = %storage_key, "cache entry stored");
        CacheWrite::Stored
      }
      Err(e) => {
        warn!(key = %storage_key, error = %e, "cache write dropped");
        CacheWrite::Failed(e.to_string())
      }
    }
  }

  /// Read the latest copy for a (user, domain) pair.
  pub fn read<T: DeserializeOwned>(&self, user_id: &str, key: DomainKey) -> CacheRead<T> {
    let storage_key = self.key_for(user_id, key);

    let payload = match self.storage.get(&storage_key) {
      Ok(Some(payload)) => payload,
      Ok(None) => {
        debug!(key = %storage_key, "cache miss");
        return CacheRead::Empty;
      }
      Err(e) => {
        warn!(key = %storage_key, error = %e, "cache read failed");
        return CacheRead::Failed(e.to_string());
      }
    };

    match serde_json::from_str::<CacheEntry<T>>(&payload) {
      Ok(entry) => {
        debug!(key = %storage_key, saved_at = %entry.saved_at, "cache hit");
        CacheRead::Hit(entry)
      }
      Err(e) => {
        warn!(key = %storage_key, error = %e, "discarding unparsable cache entry");
        CacheRead::Failed(e.to_string())
      }
    }
  }

  /// Fetch a collection with network-first, cache-fallback semantics.
  ///
  /// 1. Try the network
  /// 2. On success, write through to the cache and return fresh data
  /// 3. On failure, return the cached copy annotated with its save time,
  ///    or an empty collection annotated as having no cache
  ///
  /// The cache is only consulted after the network attempt has failed.
  pub async fn fetch_or_fallback<T, F, Fut>(
    &self,
    user_id: &str,
    key: DomainKey,
    fetcher: F,
  ) -> Fetched<T>
  where
    T: Serialize + DeserializeOwned + Default,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    match fetcher().await {
      Ok(data) => {
        self.write(user_id, key, &data);
        Fetched::from_network(data)
      }
      Err(e) => {
        warn!(domain = %key, error = %e, "authoritative fetch failed, falling back to cache");
        self.fallback(user_id, key)
      }
    }
  }

  /// Cached copy for a (user, domain) pair as fallback data.
  pub fn fallback<T>(&self, user_id: &str, key: DomainKey) -> Fetched<T>
  where
    T: DeserializeOwned + Default,
  {
    match self.read(user_id, key).into_entry() {
      Some(entry) => Fetched::from_cache(entry),
      None => Fetched::empty(),
    }
  }
}

impl<S: CacheStorage> Clone for LocalCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      prefix: self.prefix.clone(),
    }
  }
}

//! Core types for the local offline cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collections that get a last-known-good copy per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainKey {
  Tasks,
  Hackathons,
}

impl DomainKey {
  pub fn as_str(&self) -> &'static str {
    match self {
      DomainKey::Tasks => "tasks",
      DomainKey::Hackathons => "hackathons",
    }
  }
}

impl fmt::Display for DomainKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A saved copy of a collection and the instant it was saved.
///
/// Serialized as `{"savedAt": "<ISO-8601>", "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  #[serde(rename = "savedAt")]
  pub saved_at: DateTime<Utc>,
  pub value: T,
}

/// Outcome of reading the local cache. Reads never fail outward.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead<T> {
  /// A parsed entry was found
  Hit(CacheEntry<T>),
  /// Nothing stored under this key
  Empty,
  /// Storage was unreachable or the entry could not be parsed
  Failed(String),
}

impl<T> CacheRead<T> {
  /// Collapse the outcome into an optional entry; failures count as misses.
  pub fn into_entry(self) -> Option<CacheEntry<T>> {
    match self {
      CacheRead::Hit(entry) => Some(entry),
      CacheRead::Empty | CacheRead::Failed(_) => None,
    }
  }
}

/// Outcome of writing to the local cache. Writes never fail outward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheWrite {
  Stored,
  Failed(String),
}

/// Staleness annotation attached to data handed to a screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
  /// Fresh data from the backend
  Network,
  /// Backend unreachable, serving the copy saved at this instant
  Cached(DateTime<Utc>),
  /// Backend unreachable and nothing saved yet
  NoCache,
}

impl Freshness {
  /// Notice shown to the user, if any.
  pub fn notice(&self) -> Option<String> {
    match self {
      Freshness::Network => None,
      Freshness::Cached(saved_at) => Some(format!(
        "Offline • showing cached data from {}",
        saved_at.to_rfc3339()
      )),
      Freshness::NoCache => Some("Offline • no cached data yet".to_string()),
    }
  }

  pub fn is_stale(&self) -> bool {
    !matches!(self, Freshness::Network)
  }
}

/// Data together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
  pub data: T,
  pub freshness: Freshness,
}

impl<T> Fetched<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      freshness: Freshness::Network,
    }
  }

  pub fn from_cache(entry: CacheEntry<T>) -> Self {
    Self {
      data: entry.value,
      freshness: Freshness::Cached(entry.saved_at),
    }
  }

  pub fn empty() -> Self
  where
    T: Default,
  {
    Self {
      data: T::default(),
      freshness: Freshness::NoCache,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_entry_uses_saved_at_field_name() {
    let entry = CacheEntry {
      saved_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
      value: vec![1, 2],
    };

    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["savedAt"], "2026-03-01T12:00:00Z");
    assert_eq!(json["value"], serde_json::json!([1, 2]));
  }

  #[test]
  fn test_notices() {
    let saved_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(Freshness::Network.notice(), None);
    assert_eq!(
      Freshness::Cached(saved_at).notice().as_deref(),
      Some("Offline • showing cached data from 2026-03-01T12:00:00+00:00")
    );
    assert_eq!(
      Freshness::NoCache.notice().as_deref(),
      Some("Offline • no cached data yet")
    );
  }
}

//! Local offline cache for last-known-good server collections.
//!
//! This module provides:
//! - A namespaced, per-user key-value store of `{savedAt, value}` entries
//! - Network-first fetching that falls back to the saved copy on failure
//! - Pluggable storage backends (SQLite, in-memory, no-op)
//!
//! Cache failures never propagate: a broken store behaves like an empty one.

mod layer;
mod storage;
mod traits;

pub use layer::{LocalCache, DEFAULT_PREFIX};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheEntry, CacheRead, CacheWrite, DomainKey, Fetched, Freshness};

//! Versioned response cache.
//!
//! Responses live in named generations. Invalidation is wholesale: a
//! generation is deleted with everything in it.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use super::network::HttpResponse;
use crate::db;
use crate::db::schema::RESPONSE_CACHE_SCHEMA;

/// Trait for response cache backends.
pub trait ResponseStore: Send + Sync {
  /// Look up a response by URL in one generation.
  fn get(&self, generation: &str, url: &str) -> Result<Option<HttpResponse>>;

  /// Store a response, creating the generation if needed. Overwrites.
  fn put(&self, generation: &str, url: &str, response: &HttpResponse) -> Result<()>;

  /// Names of every existing generation.
  fn generations(&self) -> Result<Vec<String>>;

  /// Drop a generation and all of its entries. Returns whether it existed.
  fn delete(&self, generation: &str) -> Result<bool>;
}

/// In-process store, lost on exit.
#[derive(Default)]
pub struct MemoryResponseStore {
  generations: Mutex<BTreeMap<String, HashMap<String, HttpResponse>>>,
}

impl MemoryResponseStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ResponseStore for MemoryResponseStore {
  fn get(&self, generation: &str, url: &str) -> Result<Option<HttpResponse>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.get(generation).and_then(|g| g.get(url)).cloned())
  }

  fn put(&self, generation: &str, url: &str, response: &HttpResponse) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    generations
      .entry(generation.to_string())
      .or_default()
      .insert(url.to_string(), response.clone());
    Ok(())
  }

  fn generations(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.keys().cloned().collect())
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.remove(generation).is_some())
  }
}

/// SQLite-based response store.
pub struct SqliteResponseStore {
  conn: Mutex<Connection>,
}

impl SqliteResponseStore {
  pub fn open(path: &Path) -> Result<Self> {
    let conn = db::open(path, RESPONSE_CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn in_memory() -> Result<Self> {
    let conn = db::open_in_memory(RESPONSE_CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

/// SHA256 of the URL for a fixed-length primary key.
fn url_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

impl ResponseStore for SqliteResponseStore {
  fn get(&self, generation: &str, url: &str) -> Result<Option<HttpResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM cached_responses
         WHERE generation = ? AND url_hash = ?",
        params![generation, url_hash(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cached response {}: {}", url, e))?;

    match row {
      Some((status, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to parse cached headers for {}: {}", url, e))?;
        Ok(Some(HttpResponse {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, url: &str, response: &HttpResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to create generation {}: {}", generation, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cached_responses (generation, url_hash, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          url_hash(url),
          url,
          response.status,
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store response {}: {}", url, e))?;

    Ok(())
  }

  fn generations(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read generation name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Rolls back on drop if any statement fails
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cached_responses WHERE generation = ?",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to delete responses of {}: {}", generation, e))?;

    let removed = tx
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete generation {}: {}", generation, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }
}

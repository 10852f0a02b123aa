pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Open a SQLite database file, creating parent directories and running
/// the given migration batch.
pub fn open(path: &Path, migrations: &str) -> Result<Connection> {
  // Ensure parent directory exists
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)
      .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
  }

  let conn = Connection::open(path)
    .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

  run_migrations(&conn, migrations)?;

  Ok(conn)
}

/// Open an in-memory database with the given migration batch applied.
pub fn open_in_memory(migrations: &str) -> Result<Connection> {
  let conn =
    Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
  run_migrations(&conn, migrations)?;
  Ok(conn)
}

fn run_migrations(conn: &Connection, migrations: &str) -> Result<()> {
  conn
    .execute_batch(migrations)
    .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
  Ok(())
}

/// Root directory for everything hacknotify persists locally.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("hacknotify"))
}

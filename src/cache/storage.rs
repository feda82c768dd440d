//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::traits::{CachedResponse, RequestKey};
use crate::net::Response;

/// Trait for cache storage backends.
///
/// A backend holds any number of named generations, each mapping request
/// identities to response snapshots. Writers are not coordinated: two puts
/// for the same key resolve to whichever lands last.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open(&self, generation: &str) -> Result<()>;

  /// All generation names, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a generation and everything in it. Returns false if it did not exist.
  fn delete(&self, generation: &str) -> Result<bool>;

  /// Store a snapshot, creating the generation if needed. Overwrites any previous entry.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Look up a request in one generation.
  fn match_in(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Look up a request across all generations, oldest generation first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Request identities stored in a generation.
  fn requests(&self, generation: &str) -> Result<Vec<RequestKey>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the cache database at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Throwaway database, gone when dropped.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("cache-agent").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named cache generations; rowid gives creation order
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_hash),
    FOREIGN KEY (generation) REFERENCES cache_generations(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_hash ON cache_entries(request_hash);
"#;

const SNAPSHOT_COLUMNS: &str =
  "e.status, e.status_text, e.headers, e.body, e.generation, e.stored_at";

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to open cache generation {}: {}", generation, e))?;

  Ok(())
}

/// Raw columns of a snapshot row, decoded outside the rusqlite closure.
type SnapshotRow = (u16, String, Vec<u8>, Vec<u8>, String, String);

fn read_snapshot(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode_snapshot(row: SnapshotRow) -> Result<CachedResponse> {
  let (status, status_text, headers, body, generation, stored_at) = row;
  let headers: Vec<(String, String)> = serde_json::from_slice(&headers)
    .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;

  Ok(CachedResponse {
    response: Response {
      status,
      status_text,
      headers,
      body,
    },
    generation,
    stored_at: parse_datetime(&stored_at)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn open(&self, generation: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_generation(&conn, generation)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache generation: {}", e))?;

    Ok(names)
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    let deleted = self
      .lock()?
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", generation, e))?;

    Ok(deleted > 0)
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    let headers = serde_json::to_vec(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    ensure_generation(&conn, generation)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (generation, request_hash, method, url, status, status_text, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          key.cache_hash(),
          key.method(),
          key.url().as_str(),
          response.status,
          response.status_text,
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key.description(), e))?;

    Ok(())
  }

  fn match_in(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM cache_entries e
           WHERE e.generation = ? AND e.request_hash = ?"
        ),
        params![generation, key.cache_hash()],
        read_snapshot,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.description(), e))?;

    row.map(decode_snapshot).transpose()
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM cache_entries e
           INNER JOIN cache_generations g ON g.name = e.generation
           WHERE e.request_hash = ?
           ORDER BY g.rowid
           LIMIT 1"
        ),
        params![key.cache_hash()],
        read_snapshot,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.description(), e))?;

    row.map(decode_snapshot).transpose()
  }

  fn requests(&self, generation: &str) -> Result<Vec<RequestKey>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT method, url FROM cache_entries WHERE generation = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![generation], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })
      .map_err(|e| eyre!("Failed to list cached requests: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cached request: {}", e))?;

    rows
      .into_iter()
      .map(|(method, url)| -> Result<RequestKey> {
        let url = Url::parse(&url).map_err(|e| eyre!("Invalid cached URL '{}': {}", url, e))?;
        Ok(RequestKey::new(&method, &url))
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A stored cache blob.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub data: Vec<u8>,
  /// When the entry was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
  /// Store (or replace) a named entry.
  fn store(&self, name: &str, data: &[u8], cached_at: DateTime<Utc>) -> Result<()>;

  /// Get a named entry.
  fn load(&self, name: &str) -> Result<Option<CachedEntry>>;

  /// Get only the timestamp of a named entry.
  fn cached_at(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

  fn remove(&self, name: &str) -> Result<()>;

  /// Remove every entry.
  fn clear(&self) -> Result<()>;
}

/// SQLite-based cache storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// Private in-memory database, gone when dropped.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    name TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL
);
"#;

impl CacheStore for SqliteStorage {
  fn store(&self, name: &str, data: &[u8], cached_at: DateTime<Utc>) -> Result<()> {
    let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    conn.execute(
      "INSERT OR REPLACE INTO cache_entries (name, data, cached_at) VALUES (?, ?, ?)",
      params![name, data, cached_at.to_rfc3339()],
    )?;
    Ok(())
  }

  fn load(&self, name: &str) -> Result<Option<CachedEntry>> {
    let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM cache_entries WHERE name = ?",
        params![name],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((data, cached_at)) => Ok(Some(CachedEntry {
        data,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn cached_at(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    let cached_at: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM cache_entries WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()?;

    cached_at.as_deref().map(parse_datetime).transpose()
  }

  fn remove(&self, name: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    conn.execute("DELETE FROM cache_entries WHERE name = ?", params![name])?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    conn.execute("DELETE FROM cache_entries", [])?;
    Ok(())
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|source| Error::Timestamp {
      value: s.to_string(),
      source,
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_store_and_load() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let now = Utc::now();
    storage.store("items", b"[1,2]", now).unwrap();

    let entry = storage.load("items").unwrap().unwrap();
    assert_eq!(entry.data, b"[1,2]");
    assert_eq!(entry.cached_at.timestamp(), now.timestamp());
    assert!(storage.load("other").unwrap().is_none());
  }

  #[test]
  fn test_store_replaces() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let earlier = Utc::now() - Duration::hours(1);
    storage.store("items", b"old", earlier).unwrap();
    storage.store("items", b"new", Utc::now()).unwrap();

    let entry = storage.load("items").unwrap().unwrap();
    assert_eq!(entry.data, b"new");
    assert!(entry.cached_at > earlier);
  }

  #[test]
  fn test_remove_and_clear() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.store("a", b"1", Utc::now()).unwrap();
    storage.store("b", b"2", Utc::now()).unwrap();

    storage.remove("a").unwrap();
    assert!(storage.cached_at("a").unwrap().is_none());
    assert!(storage.cached_at("b").unwrap().is_some());

    storage.clear().unwrap();
    assert!(storage.load("b").unwrap().is_none());
  }

  #[test]
  fn test_open_creates_parent_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let storage = SqliteStorage::open(&path).unwrap();
    storage.store("x", b"{}", Utc::now()).unwrap();
    assert!(path.exists());
  }
}

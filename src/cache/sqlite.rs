//! SQLite-backed tier store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::store::{Tier, TierStore};
use crate::http::StoredResponse;

/// Durable tier store backed by a single SQLite file.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named tier registry; sweep targets come from here
CREATE TABLE IF NOT EXISTS tiers (
    name TEXT PRIMARY KEY
);

-- Cached responses keyed by (tier, request_key)
CREATE TABLE IF NOT EXISTS entries (
    tier TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tier, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_tier ON entries(tier);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at a specific path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("satchel").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

impl TierStore for SqliteStore {
  fn open_named(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("INSERT OR IGNORE INTO tiers (name) VALUES (?)", params![name])
      .map_err(|e| eyre!("Failed to open tier {}: {}", name, e))?;

    Ok(())
  }

  fn lookup(&self, tier: Tier, key: &str) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, content_type, body, stored_at FROM entries
         WHERE tier = ? AND request_key = ?",
        params![tier.name(), key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache entry: {}", e))?;

    match row {
      Some((status, content_type, body, stored_at_str)) => {
        let stored_at = parse_datetime(&stored_at_str)?;
        Ok(Some(StoredResponse {
          status,
          content_type,
          body,
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, tier: Tier, key: &str, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Re-registering the tier inside the same transaction keeps a put that
    // interleaves with a tier delete consistent: either the delete wins
    // wholesale or the entry lands in a registered tier.
    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO tiers (name) VALUES (?)",
        params![tier.name()],
      )
      .map_err(|e| eyre!("Failed to register tier {}: {}", tier.name(), e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (tier, request_key, status, content_type, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          tier.name(),
          key,
          response.status,
          response.content_type,
          response.body,
          format_datetime(response.stored_at),
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete_tier(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE tier = ?", params![name])
      .map_err(|e| eyre!("Failed to delete tier entries: {}", e))?;

    let deleted = conn
      .execute("DELETE FROM tiers WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete tier {}: {}", name, e))?;

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  fn tier_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM tiers ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare tier query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query tiers: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn len(&self, tier: Tier) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE tier = ?",
        params![tier.name()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count tier entries: {}", e))?;

    Ok(count as usize)
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn open_temp() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("cache.db")).unwrap();
    (dir, store)
  }

  fn response(body: &str) -> StoredResponse {
    StoredResponse::new(200, Some("text/plain".to_string()), body.as_bytes().to_vec())
  }

  #[test]
  fn test_put_then_lookup() {
    let (_dir, store) = open_temp();

    store.put(Tier::Api, "key-1", &response("hello")).unwrap();

    let cached = store.lookup(Tier::Api, "key-1").unwrap().unwrap();
    assert_eq!(cached.status, 200);
    assert_eq!(cached.body, b"hello");
    assert_eq!(cached.content_type.as_deref(), Some("text/plain"));
  }

  #[test]
  fn test_lookup_miss() {
    let (_dir, store) = open_temp();
    assert!(store.lookup(Tier::Api, "missing").unwrap().is_none());
  }

  #[test]
  fn test_put_is_last_write_wins() {
    let (_dir, store) = open_temp();

    store.put(Tier::Static, "key-1", &response("old")).unwrap();
    store.put(Tier::Static, "key-1", &response("new")).unwrap();

    assert_eq!(store.len(Tier::Static).unwrap(), 1);
    let cached = store.lookup(Tier::Static, "key-1").unwrap().unwrap();
    assert_eq!(cached.body, b"new");
  }

  #[test]
  fn test_tiers_are_independent() {
    let (_dir, store) = open_temp();

    store.put(Tier::Static, "key-1", &response("static")).unwrap();
    store.put(Tier::Dynamic, "key-1", &response("dynamic")).unwrap();

    let cached = store.lookup(Tier::Static, "key-1").unwrap().unwrap();
    assert_eq!(cached.body, b"static");
    assert_eq!(store.len(Tier::Dynamic).unwrap(), 1);
  }

  #[test]
  fn test_delete_tier_removes_entries_and_name() {
    let (_dir, store) = open_temp();

    store.open_named("static-v0").unwrap();
    store.put(Tier::Static, "key-1", &response("keep")).unwrap();

    assert!(store.delete_tier("static-v0").unwrap());
    assert!(!store.delete_tier("static-v0").unwrap());

    let names = store.tier_names().unwrap();
    assert_eq!(names, vec![Tier::Static.name().to_string()]);
    assert_eq!(store.len(Tier::Static).unwrap(), 1);
  }

  #[test]
  fn test_put_survives_tier_delete_interleave() {
    let (_dir, store) = open_temp();

    store.put(Tier::Dynamic, "key-1", &response("first")).unwrap();
    store.delete_tier(Tier::Dynamic.name()).unwrap();
    store.put(Tier::Dynamic, "key-2", &response("second")).unwrap();

    // The later put re-registers the tier instead of corrupting the store
    assert!(store
      .tier_names()
      .unwrap()
      .contains(&Tier::Dynamic.name().to_string()));
    assert_eq!(store.len(Tier::Dynamic).unwrap(), 1);
  }

  #[test]
  fn test_stored_at_round_trips() {
    let (_dir, store) = open_temp();

    let original = response("dated");
    store.put(Tier::Api, "key-1", &original).unwrap();

    let cached = store.lookup(Tier::Api, "key-1").unwrap().unwrap();
    // Second precision after the SQLite round trip
    assert_eq!(
      cached.stored_at.timestamp(),
      original.stored_at.timestamp()
    );
  }
}

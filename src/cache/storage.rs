//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::traits::{CachedEntry, RequestKey};
use crate::net::{Response, ResponseKind};
use crate::worker::WorkerState;

/// A worker version and its persisted lifecycle state.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
  pub version: String,
  pub state: WorkerState,
  pub updated_at: DateTime<Utc>,
}

/// Summary of one cache generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationInfo {
  pub name: String,
  pub entries: usize,
  pub created_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// All durable worker state lives here: cache generations, worker
/// registrations and pending sync tags.
pub trait CacheStorage: Send + Sync {
  /// Names of every cache generation, oldest first.
  fn generation_names(&self) -> Result<Vec<String>>;

  /// Names, entry counts and creation times of every generation.
  fn generations(&self) -> Result<Vec<GenerationInfo>>;

  /// Look up an entry by request key.
  fn match_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a single entry, creating the generation if needed (last write wins).
  fn put_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several entries as one unit: either all are written or none.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Delete a generation and all its entries. Returns false if it did not exist.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Lifecycle state of a worker version (`Uninstalled` if never seen).
  fn worker_state(&self, version: &str) -> Result<WorkerState>;

  fn set_worker_state(&self, version: &str, state: WorkerState) -> Result<()>;

  fn registrations(&self) -> Result<Vec<Registration>>;

  /// Record a sync tag requested by a page. Registering twice keeps one.
  fn register_sync(&self, tag: &str) -> Result<()>;

  fn pending_syncs(&self) -> Result<Vec<String>>;

  fn remove_sync(&self, tag: &str) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`, or the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// In-memory database, discarded on drop.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
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
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("swcache").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cache generation (version name)
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses, keyed by hash of "METHOD url"
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    response_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    kind TEXT NOT NULL,
    redirected INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, key_hash)
);

-- Worker lifecycle per version
CREATE TABLE IF NOT EXISTS registrations (
    version TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Sync tags registered by pages, waiting for connectivity
CREATE TABLE IF NOT EXISTS sync_registrations (
    tag TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

fn insert_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", generation, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries
         (generation, key_hash, method, url, response_url, status, kind, redirected, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        key.cache_hash(),
        key.method,
        key.url,
        response.url.as_str(),
        response.status,
        response.kind.as_str(),
        response.redirected,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn generation_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn generations(&self) -> Result<Vec<GenerationInfo>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT g.name, g.created_at, COUNT(e.key_hash) FROM generations g
         LEFT JOIN entries e ON e.generation = g.name
         GROUP BY g.name
         ORDER BY g.created_at, g.name",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache row: {}", e))?;

    rows
      .into_iter()
      .map(|(name, created_at, entries)| {
        Ok(GenerationInfo {
          name,
          entries: entries as usize,
          created_at: parse_datetime(&created_at)?,
        })
      })
      .collect()
  }

  fn match_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT response_url, status, kind, redirected, headers, body, cached_at FROM entries
         WHERE generation = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    type Row = (String, u16, String, bool, String, Vec<u8>, String);
    let row: Option<Row> = stmt
      .query_row(params![generation, key.cache_hash()], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
          row.get(6)?,
        ))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    let Some((response_url, status, kind, redirected, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let response = Response {
      url: Url::parse(&response_url)
        .map_err(|e| eyre!("Corrupt cached URL '{}': {}", response_url, e))?,
      status,
      kind: ResponseKind::parse(&kind).ok_or_else(|| eyre!("Corrupt response kind '{}'", kind))?,
      redirected,
      headers: serde_json::from_str(&headers)
        .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?,
      body,
    };

    Ok(Some(CachedEntry {
      response,
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, generation, key, response)
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Still create the generation when the manifest is empty
    tx.execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", generation, e))?;

    for (key, response) in entries {
      insert_entry(&tx, generation, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let deleted = tx
      .execute("DELETE FROM generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  fn worker_state(&self, version: &str) -> Result<WorkerState> {
    let conn = self.lock()?;

    let state: Option<String> = conn
      .query_row(
        "SELECT state FROM registrations WHERE version = ?",
        params![version],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read worker state: {}", e))?;

    match state {
      Some(s) => s.parse(),
      None => Ok(WorkerState::Uninstalled),
    }
  }

  fn set_worker_state(&self, version: &str, state: WorkerState) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO registrations (version, state, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![version, state.as_str()],
      )
      .map_err(|e| eyre!("Failed to store worker state: {}", e))?;

    Ok(())
  }

  fn registrations(&self) -> Result<Vec<Registration>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT version, state, updated_at FROM registrations ORDER BY updated_at, version")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list registrations: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read registration: {}", e))?;

    rows
      .into_iter()
      .map(|(version, state, updated_at)| {
        Ok(Registration {
          version,
          state: state.parse()?,
          updated_at: parse_datetime(&updated_at)?,
        })
      })
      .collect()
  }

  fn register_sync(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO sync_registrations (tag) VALUES (?)",
        params![tag],
      )
      .map_err(|e| eyre!("Failed to register sync '{}': {}", tag, e))?;

    Ok(())
  }

  fn pending_syncs(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT tag FROM sync_registrations ORDER BY registered_at, tag")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let tags = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list sync registrations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read sync tag: {}", e))?;

    Ok(tags)
  }

  fn remove_sync(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM sync_registrations WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to remove sync '{}': {}", tag, e))?;

    Ok(())
  }
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

  fn url(path: &str) -> Url {
    Url::parse("http://localhost:8080").unwrap().join(path).unwrap()
  }

  fn page(path: &str, body: &str) -> (RequestKey, Response) {
    let url = url(path);
    (
      RequestKey::get(&url),
      Response {
        url,
        status: 200,
        kind: ResponseKind::Basic,
        redirected: false,
        headers: vec![("content-type".to_string(), "text/html".to_string())],
        body: body.as_bytes().to_vec(),
      },
    )
  }

  #[test]
  fn test_put_and_match_round_trip() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let (key, response) = page("/主頁.html", "<h1>home</h1>");

    storage.put_entry("v1", &key, &response).unwrap();

    let entry = storage.match_entry("v1", &key).unwrap().unwrap();
    assert_eq!(entry.response, response);
    assert_eq!(storage.generation_names().unwrap(), vec!["v1".to_string()]);
  }

  #[test]
  fn test_match_is_generation_scoped() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let (key, response) = page("/rate.html", "rates");

    storage.put_entry("v1", &key, &response).unwrap();

    assert!(storage.match_entry("v2", &key).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_same_key() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let (key, first) = page("/hot.html", "old");
    let (_, second) = page("/hot.html", "new");

    storage.put_entry("v1", &key, &first).unwrap();
    storage.put_entry("v1", &key, &second).unwrap();

    let entry = storage.match_entry("v1", &key).unwrap().unwrap();
    assert_eq!(entry.response.body, b"new");
    assert_eq!(storage.generations().unwrap()[0].entries, 1);
  }

  #[test]
  fn test_put_all_empty_still_creates_generation() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put_all("v1", &[]).unwrap();

    let generations = storage.generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].entries, 0);
  }

  #[test]
  fn test_delete_generation_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![page("/a.html", "a"), page("/b.html", "b")];
    storage.put_all("v1", &entries).unwrap();
    storage.put_all("v2", &entries[..1]).unwrap();

    assert!(storage.delete_generation("v1").unwrap());
    assert!(!storage.delete_generation("v1").unwrap());

    assert!(storage.match_entry("v1", &entries[0].0).unwrap().is_none());
    assert!(storage.match_entry("v2", &entries[0].0).unwrap().is_some());
    assert_eq!(storage.generation_names().unwrap(), vec!["v2".to_string()]);
  }

  #[test]
  fn test_worker_state_defaults_to_uninstalled() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.worker_state("v1").unwrap(), WorkerState::Uninstalled);

    storage.set_worker_state("v1", WorkerState::Installed).unwrap();
    assert_eq!(storage.worker_state("v1").unwrap(), WorkerState::Installed);

    let registrations = storage.registrations().unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].state, WorkerState::Installed);
  }

  #[test]
  fn test_sync_registrations_deduplicate() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.register_sync("background-sync").unwrap();
    storage.register_sync("background-sync").unwrap();
    storage.register_sync("other").unwrap();

    let mut pending = storage.pending_syncs().unwrap();
    pending.sort();
    assert_eq!(pending, vec!["background-sync".to_string(), "other".to_string()]);

    storage.remove_sync("other").unwrap();
    assert_eq!(storage.pending_syncs().unwrap(), vec!["background-sync".to_string()]);
  }
}

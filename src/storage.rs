use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

// Validation constants
const MAX_KEY_LENGTH: usize = 128;

/// Validate state key (non-empty, bounded, no control characters)
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("State key cannot be empty");
    }
    if key.len() > MAX_KEY_LENGTH {
        bail!("State key too long (max {} chars)", MAX_KEY_LENGTH);
    }
    if key.chars().any(|c| c.is_control()) {
        bail!("State key contains invalid characters");
    }
    Ok(())
}

/// Validate database file extension
pub fn validate_db_extension(path: &Path) -> Result<()> {
    match path.extension() {
        Some(ext) if ext == "db" => Ok(()),
        Some(_) => bail!("Invalid database file extension (must be .db)"),
        None => bail!("Database path must have .db extension"),
    }
}

/// Durable key-value persistence for archive state.
///
/// Values are opaque strings (serialized JSON documents); callers own the format.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

const SCHEMA: &str = r#"
-- One row per persisted document (graph, conversation)
CREATE TABLE IF NOT EXISTS archive_state (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
) STRICT;
"#;

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open or create database with connection pool
    pub fn open(path: &Path) -> Result<Self> {
        validate_db_extension(path)?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection from pool")?;

            // WAL keeps write-through saves cheap
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;

            conn.execute_batch(SCHEMA)?;
        }

        Ok(Self { pool })
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let conn = self.pool.get()
            .context("Failed to get database connection from pool")?;
        conn.query_row(
            "SELECT value FROM archive_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to load state '{}'", key))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let conn = self.pool.get()
            .context("Failed to get database connection from pool")?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO archive_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
        )
        .context("Failed to prepare upsert statement for archive state")?;

        stmt.execute(params![key, value])
            .with_context(|| format!("Failed to save state '{}'", key))?;
        Ok(())
    }
}

/// Ephemeral store; everything is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let data = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(data.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let mut data = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_save_load_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("state.db")).unwrap();

        assert_eq!(store.load("graph").unwrap(), None);
        store.save("graph", "{\"nodes\":[]}").unwrap();
        store.save("graph", "{\"nodes\":[1]}").unwrap();
        assert_eq!(store.load("graph").unwrap().as_deref(), Some("{\"nodes\":[1]}"));
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save("conversation", "[]").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load("conversation").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_rejects_non_db_extension() {
        let dir = TempDir::new().unwrap();
        assert!(SqliteStore::open(&dir.path().join("state.sqlite")).is_err());
        assert!(SqliteStore::open(&dir.path().join("state")).is_err());
    }

    #[test]
    fn test_rejects_invalid_keys() {
        let store = MemoryStore::new();
        assert!(store.save("", "x").is_err());
        assert!(store.save("bad\nkey", "x").is_err());
        assert!(store.load(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.save("graph", "a").unwrap();
        assert_eq!(store.load("graph").unwrap().as_deref(), Some("a"));
        assert_eq!(store.load("other").unwrap(), None);
    }
}

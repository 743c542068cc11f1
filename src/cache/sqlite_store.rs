//! File-backed volatile tier shared between processes.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::volatile::VolatileStore;
use super::CacheResult;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER
);
";

/// Volatile tier backed by a SQLite table with an `expires_at` column (unix seconds).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl VolatileStore for SqliteStore {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM entries
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_secs()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| now_secs().saturating_add(ttl.as_secs() as i64));
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            params![key, now_secs()],
        )?;
        // Expired rows for the key go too.
        conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM entries
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_secs()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        let conn = self.conn.lock();
        let now = now_secs();
        conn.execute(
            "DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;
        let mut stmt = conn.prepare("SELECT key FROM entries ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn flush(&self) -> CacheResult<()> {
        self.conn.lock().execute("DELETE FROM entries", [])?;
        Ok(())
    }
}

// src/memory/store.rs — SQLite-backed key/value blobs

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{schema, KvStore};
use crate::infra::errors::{Result, SynapseError};

/// Durable blob store. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self::new(conn))
    }

    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SynapseError::Other(anyhow::anyhow!("store connection poisoned")))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<String>, _>>()?)
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_overwrite() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get("codebook").unwrap(), None);
        store.set("codebook", b"one").unwrap();
        store.set("codebook", b"two").unwrap();
        assert_eq!(store.get("codebook").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["codebook".to_string()]);
    }

    #[test]
    fn test_delete() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("skills", b"[]").unwrap();
        assert!(store.delete("skills").unwrap());
        assert!(!store.delete("skills").unwrap());
        assert_eq!(store.get("skills").unwrap(), None);
    }
}

//! SQLite-backed store, providing restart safety for check records.
//!
//! # Schema Versioning
//!
//! The database uses SQLite's `user_version` pragma to track schema versions.
//! When the schema changes, increment `SCHEMA_VERSION` and add a migration
//! function in `run_migrations`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::KvStore;
use crate::error::StoreError;

/// Current schema version. Increment when making schema changes.
const SCHEMA_VERSION: i32 = 1;

/// SQLite store.
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`.
/// Every operation runs the blocking SQLite call inside
/// `tokio::task::spawn_blocking`.
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvStore {
    /// Open or create the database file at the given path.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");

        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if current_version > SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is newer than supported version {}. \
                 Please upgrade the application.",
                current_version,
                SCHEMA_VERSION
            );
        }

        if current_version < SCHEMA_VERSION {
            Self::run_migrations(&conn, current_version)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
        if from_version < 1 {
            Self::migrate_v0_to_v1(conn)?;
        }

        // Future migrations go here.

        Ok(())
    }

    fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking panicked: {}", e)))?
        .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map(|_| ())
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Escape LIKE metacharacters so a literal prefix match is performed.
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\'")?;
            let keys = stmt
                .query_map(params![pattern], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SqliteKvStore::new_in_memory().expect("should create store");
        store.put("check:acme/repo:42", r#"{"x":1}"#).await.unwrap();
        assert_eq!(
            store.get("check:acme/repo:42").await.unwrap(),
            Some(r#"{"x":1}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_put_overwrites_existing() {
        let store = SqliteKvStore::new_in_memory().expect("should create store");
        store.put("k", "old").await.unwrap();
        store.put("k", "new").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_delete_removes_key() {
        let store = SqliteKvStore::new_in_memory().expect("should create store");
        store.put("k", "v").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = SqliteKvStore::new_in_memory().expect("should create store");
        store.put("check:acme/repo:1", "a").await.unwrap();
        store.put("check:other/repo:2", "b").await.unwrap();
        store.put("rate-limit:openai", "c").await.unwrap();

        let mut keys = store.list("check:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["check:acme/repo:1", "check:other/repo:2"]);
    }

    #[tokio::test]
    async fn test_list_treats_underscore_literally() {
        let store = SqliteKvStore::new_in_memory().expect("should create store");
        store.put("rate_limit:openai", "a").await.unwrap();
        store.put("rateXlimit:openai", "b").await.unwrap();

        let keys = store.list("rate_limit:").await.unwrap();
        assert_eq!(keys, vec!["rate_limit:openai"]);
    }

    #[tokio::test]
    async fn test_persistence_survives_reload() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let db_path = dir.path().join("draftcheck-state.db");

        {
            let store = SqliteKvStore::new(&db_path).expect("should create store");
            store.put("check:acme/repo:42", "persisted").await.unwrap();
        }

        {
            let store = SqliteKvStore::new(&db_path).expect("should reopen store");
            assert_eq!(
                store.get("check:acme/repo:42").await.unwrap(),
                Some("persisted".to_string())
            );
        }
    }
}

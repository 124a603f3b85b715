//! SQLite-backed durable store.
//!
//! One row per `(actor_key, slot)` holding the serialized state document.
//! Writes are synchronous upserts so a returned `put` has reached the
//! database file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::{DurableStore, StoreError};

/// SQLite state store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL keeps readers off the writer's lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS actor_state (
                actor_key TEXT NOT NULL,
                slot TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (actor_key, slot)
            );
            "#,
        )?;

        debug!("Actor state schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    /// Run a blocking closure against the connection off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| {
                StoreError::Unavailable("sqlite connection lock poisoned".to_string())
            })?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, key: &str, slot: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let key = key.to_string();
        let slot = slot.to_string();

        let raw: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT value FROM actor_state WHERE actor_key = ?1 AND slot = ?2",
                    params![key, slot],
                    |row| row.get(0),
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        raw.map(|text| serde_json::from_str(&text).map_err(Into::into))
            .transpose()
    }

    async fn put(
        &self,
        key: &str,
        slot: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let key = key.to_string();
        let slot = slot.to_string();
        let text = serde_json::to_string(value)?;
        let now = chrono::Utc::now().timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO actor_state (actor_key, slot, value, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(actor_key, slot) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![key, slot, text, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str, slot: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let slot = slot.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM actor_state WHERE actor_key = ?1 AND slot = ?2",
                params![key, slot],
            )?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

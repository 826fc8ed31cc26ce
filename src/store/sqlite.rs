//! SQLite Entity Store
//!
//! Durable engine backed by a single `items` table. Each record is stored as a
//! JSON document; secondary-index lookups use `json_extract`. All calls run on
//! the blocking pool so the async runtime is never stalled by disk I/O.

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::{EntityStore, FieldUpdate, PutItem, Record};
use super::error::{StoreError, StoreResult};

const SCHEMA_SQL: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS items (
        collection TEXT NOT NULL,
        item_key   TEXT NOT NULL,
        body       TEXT NOT NULL,
        PRIMARY KEY (collection, item_key)
    );
";

/// SQLite-backed entity store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        debug!("Opened sqlite store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a throwaway in-memory store
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await?
    }
}

fn insert_item(conn: &Connection, put: &PutItem) -> StoreResult<()> {
    let body = serde_json::to_string(&put.record)?;
    let result = conn.execute(
        "INSERT INTO items (collection, item_key, body) VALUES (?1, ?2, ?3)",
        params![put.collection, put.key, body],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::conflict(&put.collection, &put.key))
        }
        Err(e) => Err(e.into()),
    }
}

fn decode_body(body: &str) -> StoreResult<Record> {
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn put_if_absent(&self, collection: &str, key: &str, record: Record) -> StoreResult<()> {
        let put = PutItem::new(collection, key, record);
        self.with_conn(move |conn| insert_item(conn, &put)).await
    }

    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Record>> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM items WHERE collection = ?1 AND item_key = ?2",
                    params![collection, key],
                    |row| row.get(0),
                )
                .optional()?;

            body.as_deref().map(decode_body).transpose()
        })
        .await
    }

    async fn update(&self, collection: &str, key: &str, updates: &[FieldUpdate]) -> StoreResult<()> {
        let (collection, key) = (collection.to_string(), key.to_string());
        let updates = updates.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM items WHERE collection = ?1 AND item_key = ?2",
                    params![collection, key],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(body) = body else {
                debug!("Update skipped, no item at {}/{}", collection, key);
                return Ok(());
            };

            let mut record = decode_body(&body)?;
            for update in updates {
                record.insert(update.field, update.value);
            }
            tx.execute(
                "UPDATE items SET body = ?3 WHERE collection = ?1 AND item_key = ?2",
                params![collection, key, serde_json::to_string(&record)?],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM items WHERE collection = ?1 AND item_key = ?2",
                params![collection, key],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_by_index(
        &self,
        collection: &str,
        index_field: &str,
        value: &str,
    ) -> StoreResult<Vec<Record>> {
        let collection = collection.to_string();
        let json_path = format!("$.{}", index_field);
        let value = value.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM items
                 WHERE collection = ?1 AND json_extract(body, ?2) = ?3
                 ORDER BY item_key ASC",
            )?;
            let bodies = stmt
                .query_map(params![collection, json_path, value], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            bodies.iter().map(|b| decode_body(b)).collect()
        })
        .await
    }

    async fn transact_write(&self, puts: Vec<PutItem>) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for put in &puts {
                // Dropping `tx` on error rolls back earlier puts
                insert_item(&tx, put)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

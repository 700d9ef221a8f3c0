//! SQLite-based store implementation

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    matches_all, merge_fields, strip_absent, Document, DocumentStore, FieldFilter, StoreError,
    StoreResult,
};

/// SQLite-based store; each document is a JSON body keyed by `(collection, id)`.
///
/// Queries run on the blocking pool, so a caller waiting on a locked database
/// file can still be timed out.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// How long a statement waits on another connection's lock before
    /// failing with "database is locked"
    pub fn with_busy_timeout(self, timeout: Duration) -> StoreResult<Self> {
        lock_conn(&self.conn)?.busy_timeout(timeout)?;
        debug!(timeout_ms = timeout.as_millis() as u64, "Busy timeout set");
        Ok(self)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = lock_conn(&self.conn)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            -- Running-timer lookups filter on these two fields
            CREATE INDEX IF NOT EXISTS idx_documents_user_running
                ON documents(collection, json_extract(body, '$.userId'), json_extract(body, '$.isRunning'));
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock_conn(&conn)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("store task failed: {}", e)))?
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StoreError::Database("connection lock poisoned".into()))
}

fn parse_body(body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::Serialization("stored body is not an object".into())),
    }
}

fn select_body(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ? AND id = ?",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Equality query shared by `query` and `create_exclusive`
fn select_matching(
    conn: &Connection,
    collection: &str,
    filters: &[FieldFilter],
) -> StoreResult<Vec<Document>> {
    let mut sql = String::from("SELECT body FROM documents WHERE collection = ?");
    let mut args: Vec<SqlValue> = vec![SqlValue::Text(collection.to_string())];

    for filter in filters {
        let path = SqlValue::Text(format!("$.{}", filter.field));
        match &filter.value {
            Value::Null => {
                sql.push_str(" AND json_extract(body, ?) IS NULL");
                args.push(path);
            }
            Value::Bool(b) => {
                sql.push_str(" AND json_extract(body, ?) = ?");
                args.push(path);
                args.push(SqlValue::Integer(i64::from(*b)));
            }
            Value::Number(n) => {
                sql.push_str(" AND json_extract(body, ?) = ?");
                args.push(path);
                if let Some(i) = n.as_i64() {
                    args.push(SqlValue::Integer(i));
                } else if let Some(f) = n.as_f64() {
                    args.push(SqlValue::Real(f));
                } else {
                    return Err(StoreError::InvalidQuery(format!("number out of range: {}", n)));
                }
            }
            Value::String(s) => {
                sql.push_str(" AND json_extract(body, ?) = ?");
                args.push(path);
                args.push(SqlValue::Text(s.clone()));
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(StoreError::InvalidQuery(format!(
                    "cannot compare field '{}' against a composite value",
                    filter.field
                )));
            }
        }
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), |row| row.get::<_, String>(0))?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(parse_body(&row?)?);
    }
    Ok(docs)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let (collection, id) = (collection.to_string(), id.to_string());
        let body = self
            .with_conn(move |conn| select_body(conn, &collection, &id))
            .await?;

        body.as_deref().map(parse_body).transpose()
    }

    async fn set(&self, collection: &str, id: &str, mut doc: Document) -> StoreResult<()> {
        strip_absent(&mut doc);
        let body = serde_json::to_string(&doc)?;
        let (collection, id) = (collection.to_string(), id.to_string());

        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO documents (collection, id, body)
                VALUES (?, ?, ?)
                ON CONFLICT(collection, id)
                DO UPDATE SET body = excluded.body
                "#,
                params![collection, id, body],
            )?;

            debug!(collection = %collection, id = %id, "Document set");
            Ok(())
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        self.update_if(collection, id, fields, &[]).await.map(|_| ())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        expected: &[FieldFilter],
    ) -> StoreResult<bool> {
        let (collection, id) = (collection.to_string(), id.to_string());
        let expected = expected.to_vec();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut doc = match select_body(&tx, &collection, &id)? {
                Some(body) => parse_body(&body)?,
                None => return Err(StoreError::NotFound(format!("{}/{}", collection, id))),
            };

            if !matches_all(&doc, &expected) {
                debug!(collection = %collection, id = %id, "Conditional update rejected");
                return Ok(false);
            }

            merge_fields(&mut doc, fields);
            tx.execute(
                "UPDATE documents SET body = ? WHERE collection = ? AND id = ?",
                params![serde_json::to_string(&doc)?, collection, id],
            )?;
            tx.commit()?;

            debug!(collection = %collection, id = %id, "Document updated");
            Ok(true)
        })
        .await
    }

    async fn query(&self, collection: &str, filters: &[FieldFilter]) -> StoreResult<Vec<Document>> {
        let collection = collection.to_string();
        let filters = filters.to_vec();
        self.with_conn(move |conn| select_matching(conn, &collection, &filters))
            .await
    }

    async fn create_exclusive(
        &self,
        collection: &str,
        id: &str,
        mut doc: Document,
        conflicts: &[FieldFilter],
    ) -> StoreResult<bool> {
        strip_absent(&mut doc);
        let body = serde_json::to_string(&doc)?;
        let (collection, id) = (collection.to_string(), id.to_string());
        let conflicts = conflicts.to_vec();

        self.with_conn(move |conn| {
            // IMMEDIATE takes the write lock up front, so other connections to the
            // same file cannot slip an insert between the check and ours.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !select_matching(&tx, &collection, &conflicts)?.is_empty() {
                debug!(collection = %collection, id = %id, "Conditional create rejected");
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)",
                params![collection, id, body],
            )?;
            tx.commit()?;

            debug!(collection = %collection, id = %id, "Document created");
            Ok(true)
        })
        .await
    }

    fn is_healthy(&self) -> bool {
        match self.conn.try_lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            // A statement is in flight on the blocking pool
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

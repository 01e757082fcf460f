//! SQLite store implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::{SubscriberId, Subscription, TaskKey, VigilError};
use crate::ports::SubscriptionStore;

/// Durable `SubscriptionStore` backed by a single sqlite table.
///
/// Design:
/// - One table keyed (subscriber_id, task_key); the primary key is what
///   makes `add` idempotent (`INSERT OR IGNORE`).
/// - Every operation commits before returning; there is no write-behind
///   cache between the reconciler and the data.
/// - Losing the file is survivable: `bootstrap` rebuilds the schema empty
///   and subscribers re-issue their subscriptions.
///
/// rusqlite is synchronous, so operations run under `spawn_blocking` with
/// the connection behind a std mutex. Contention is a non-issue at this
/// table's size; what matters is keeping the executor threads unblocked.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VigilError> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database. Same code paths as `open`, no file;
    /// used by tests and volatile runs.
    pub fn in_memory() -> Result<Self, VigilError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn bootstrap(conn: &Connection) -> Result<(), VigilError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                 subscriber_id INTEGER NOT NULL,
                 task_key      TEXT    NOT NULL,
                 PRIMARY KEY (subscriber_id, task_key)
             )",
        )
        .map_err(storage_err)
    }

    /// Run `f` with the connection on a blocking thread.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, VigilError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| VigilError::StorageUnavailable("connection mutex poisoned".into()))?;
            f(&conn).map_err(storage_err)
        })
        .await
        .map_err(|e| VigilError::StorageUnavailable(format!("blocking task failed: {e}")))?
    }
}

fn storage_err(err: rusqlite::Error) -> VigilError {
    VigilError::StorageUnavailable(err.to_string())
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn add(&self, subscriber: SubscriberId, task: &TaskKey) -> Result<(), VigilError> {
        let (sub, key) = (subscriber.as_i64(), task.as_str().to_owned());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO subscriptions (subscriber_id, task_key) VALUES (?1, ?2)",
                params![sub, key],
            )
            .map(|_| ())
        })
        .await
    }

    async fn exists(
        &self,
        subscriber: SubscriberId,
        task: &TaskKey,
    ) -> Result<bool, VigilError> {
        let (sub, key) = (subscriber.as_i64(), task.as_str().to_owned());
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM subscriptions WHERE subscriber_id = ?1 AND task_key = ?2",
                params![sub, key],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
        .await
    }

    async fn remove(&self, subscriber: SubscriberId, task: &TaskKey) -> Result<(), VigilError> {
        let (sub, key) = (subscriber.as_i64(), task.as_str().to_owned());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM subscriptions WHERE subscriber_id = ?1 AND task_key = ?2",
                params![sub, key],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove_all(&self, subscriber: SubscriberId) -> Result<(), VigilError> {
        let sub = subscriber.as_i64();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM subscriptions WHERE subscriber_id = ?1",
                params![sub],
            )
            .map(|_| ())
        })
        .await
    }

    async fn list_for(&self, subscriber: SubscriberId) -> Result<Vec<TaskKey>, VigilError> {
        let sub = subscriber.as_i64();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT task_key FROM subscriptions WHERE subscriber_id = ?1 ORDER BY task_key",
            )?;
            let rows = stmt.query_map(params![sub], |row| {
                Ok(TaskKey::new(row.get::<_, String>(0)?))
            })?;
            rows.collect()
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, VigilError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT subscriber_id, task_key FROM subscriptions
                 ORDER BY subscriber_id, task_key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Subscription::new(
                    SubscriberId::new(row.get(0)?),
                    TaskKey::new(row.get::<_, String>(1)?),
                ))
            })?;
            rows.collect()
        })
        .await
    }
}

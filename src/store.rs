//! Whole-collection JSON storage on SQLite.
//!
//! Every collection is one row holding a JSON array. Reads never fail on a
//! malformed payload: they fall back to the caller's default and log
//! `collection_corrupt`. Writes replace the whole array in one transaction and
//! surface every engine failure as [`STORE_WRITE_FAILED`].
//!
//! Mutations of one collection are serialized through a per-collection mutex,
//! so an in-process read-modify-write can never lose another one's update.
//! Operations spanning several collections take every lock in enumerated order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, MutexGuard};

use crate::collections::CollectionName;
use crate::error::{STORE_READ_FAILED, STORE_WRITE_FAILED};
use crate::time::now_rfc3339;
use crate::{AppError, AppResult};

/// What a collection's stored payload looks like right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollectionState {
    Missing,
    Valid { len: usize },
    Corrupt { reason: String },
}

/// Result of a closure passed to [`CollectionStore::mutate`].
#[derive(Debug)]
pub enum Edit<R> {
    /// The records were changed and must be written back.
    Changed(R),
    /// Nothing to persist.
    Unchanged(R),
}

#[derive(Debug, Clone)]
pub struct Mutated<T, R> {
    pub output: R,
    /// The collection as it stands after the mutation.
    pub records: Vec<T>,
    pub written: bool,
    /// The stored text was unreadable as `T` and was set aside before the
    /// write.
    pub quarantined: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedPayload {
    pub name: String,
    pub payload: String,
    pub reason: String,
    pub quarantined_at: String,
}

enum Loaded {
    Missing,
    Array(Vec<Value>),
    Corrupt(String),
}

/// Records handed to the caller, plus why the default was substituted.
struct Typed<T> {
    records: Vec<T>,
    corrupt: Option<String>,
}

struct PendingWrite {
    name: CollectionName,
    payload: String,
    /// Stored text parsed as an array but its records did not decode.
    schema_mismatch: Option<String>,
}

impl PendingWrite {
    fn new(name: CollectionName, payload: String) -> Self {
        Self {
            name,
            payload,
            schema_mismatch: None,
        }
    }
}

pub struct CollectionStore {
    pool: SqlitePool,
    locks: Vec<Mutex<()>>,
}

impl CollectionStore {
    pub fn new(pool: SqlitePool) -> Self {
        let locks = CollectionName::ALL.iter().map(|_| Mutex::new(())).collect();
        Self { pool, locks }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stored array for `name`, or `default` if never written or unparseable.
    pub async fn get(&self, name: CollectionName, default: Vec<Value>) -> AppResult<Vec<Value>> {
        self.get_typed(name, default).await
    }

    /// Like [`get`](Self::get) but decodes into `T`; a schema mismatch counts
    /// as corruption.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        name: CollectionName,
        default: Vec<T>,
    ) -> AppResult<Vec<T>> {
        let mut conn = self.acquire(name).await?;
        Ok(read_typed(&mut conn, name, default).await?.records)
    }

    pub async fn inspect(&self, name: CollectionName) -> AppResult<CollectionState> {
        let mut conn = self.acquire(name).await?;
        Ok(match load(&mut conn, name).await? {
            Loaded::Missing => CollectionState::Missing,
            Loaded::Array(items) => CollectionState::Valid { len: items.len() },
            Loaded::Corrupt(reason) => CollectionState::Corrupt { reason },
        })
    }

    /// Durably overwrite the whole collection.
    pub async fn replace<T: Serialize>(&self, name: CollectionName, records: &[T]) -> AppResult<()> {
        let payload = encode(name, records)?;
        let _guard = self.locks[name.index()].lock().await;
        self.write_all(&[PendingWrite::new(name, payload)]).await
    }

    /// Replace several collections in one transaction: all or nothing.
    pub async fn replace_many(&self, entries: Vec<(CollectionName, Vec<Value>)>) -> AppResult<()> {
        let lock = self.lock_all().await;
        lock.replace_many(entries).await
    }

    /// Read-modify-write one collection while holding its mutex.
    ///
    /// If the stored records did not decode as `T`, `f` sees `default` and the
    /// stored text is quarantined before the new array replaces it.
    pub async fn mutate<T, R, F>(
        &self,
        name: CollectionName,
        default: Vec<T>,
        f: F,
    ) -> AppResult<Mutated<T, R>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> AppResult<Edit<R>>,
    {
        let _guard = self.locks[name.index()].lock().await;
        let Typed {
            mut records,
            corrupt,
        } = {
            let mut conn = self.acquire(name).await?;
            read_typed(&mut conn, name, default).await?
        };
        match f(&mut records)? {
            Edit::Unchanged(output) => Ok(Mutated {
                output,
                records,
                written: false,
                quarantined: false,
            }),
            Edit::Changed(output) => {
                let payload = encode(name, &records)?;
                let quarantined = corrupt.is_some();
                self.write_all(&[PendingWrite {
                    name,
                    payload,
                    schema_mismatch: corrupt,
                }])
                .await?;
                Ok(Mutated {
                    output,
                    records,
                    written: true,
                    quarantined,
                })
            }
        }
    }

    /// Take every collection lock, in enumerated order.
    pub async fn lock_all(&self) -> StoreLock<'_> {
        let mut guards = Vec::with_capacity(self.locks.len());
        for lock in &self.locks {
            guards.push(lock.lock().await);
        }
        StoreLock {
            store: self,
            _guards: guards,
        }
    }

    /// Drop every stored collection and quarantined payload.
    pub async fn wipe(&self) -> AppResult<()> {
        let _lock = self.lock_all().await;
        let mut tx = self.pool.begin().await.map_err(write_failed_any)?;
        sqlx::query("DELETE FROM collections")
            .execute(&mut *tx)
            .await
            .map_err(write_failed_any)?;
        sqlx::query("DELETE FROM collection_quarantine")
            .execute(&mut *tx)
            .await
            .map_err(write_failed_any)?;
        tx.commit().await.map_err(write_failed_any)?;
        tracing::warn!(target: "ironward", event = "store_wiped");
        Ok(())
    }

    /// Payloads set aside because they were corrupt when overwritten.
    pub async fn quarantined(&self, name: CollectionName) -> AppResult<Vec<QuarantinedPayload>> {
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT name, payload, reason, quarantined_at FROM collection_quarantine WHERE name = ? ORDER BY id",
        )
        .bind(name.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| read_failed(name, err))?;
        Ok(rows
            .into_iter()
            .map(|(name, payload, reason, quarantined_at)| QuarantinedPayload {
                name,
                payload,
                reason,
                quarantined_at,
            })
            .collect())
    }

    async fn acquire(
        &self,
        name: CollectionName,
    ) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|err| read_failed(name, err))
    }

    async fn write_all(&self, entries: &[PendingWrite]) -> AppResult<()> {
        let first = entries.first().map(|entry| entry.name);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| write_failed(first, err))?;
        tracing::debug!(target: "ironward", event = "db_tx_begin", collections = entries.len());

        for entry in entries {
            if let Err(err) = write_collection(&mut tx, entry).await {
                if let Err(rb) = tx.rollback().await {
                    tracing::error!(target: "ironward", event = "db_tx_rollback_failed", error = %rb);
                } else {
                    tracing::warn!(target: "ironward", event = "db_tx_rollback", collection = %entry.name);
                }
                return Err(write_failed(Some(entry.name), err));
            }
        }

        tx.commit().await.map_err(|err| write_failed(first, err))?;
        tracing::debug!(target: "ironward", event = "db_tx_commit", collections = entries.len());
        Ok(())
    }
}

/// Proof that every collection lock is held.
///
/// Snapshot and restore read and write through this so nothing interleaves.
pub struct StoreLock<'a> {
    store: &'a CollectionStore,
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl StoreLock<'_> {
    pub async fn get(&self, name: CollectionName, default: Vec<Value>) -> AppResult<Vec<Value>> {
        let mut conn = self.store.acquire(name).await?;
        Ok(read_typed(&mut conn, name, default).await?.records)
    }

    pub async fn replace_many(&self, entries: Vec<(CollectionName, Vec<Value>)>) -> AppResult<()> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (name, records) in &entries {
            encoded.push(PendingWrite::new(*name, encode(*name, records)?));
        }
        self.store.write_all(&encoded).await
    }
}

async fn load(conn: &mut SqliteConnection, name: CollectionName) -> AppResult<Loaded> {
    let payload: Option<String> =
        sqlx::query_scalar("SELECT CAST(payload AS TEXT) FROM collections WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|err| read_failed(name, err))?;

    Ok(match payload {
        None => Loaded::Missing,
        Some(text) => match parse_array(&text) {
            Ok(items) => Loaded::Array(items),
            Err(reason) => Loaded::Corrupt(reason),
        },
    })
}

async fn read_typed<T: DeserializeOwned>(
    conn: &mut SqliteConnection,
    name: CollectionName,
    default: Vec<T>,
) -> AppResult<Typed<T>> {
    let reason = match load(conn, name).await? {
        Loaded::Missing => {
            return Ok(Typed {
                records: default,
                corrupt: None,
            })
        }
        Loaded::Corrupt(reason) => reason,
        Loaded::Array(items) => match serde_json::from_value::<Vec<T>>(Value::Array(items)) {
            Ok(records) => {
                return Ok(Typed {
                    records,
                    corrupt: None,
                })
            }
            Err(err) => format!("records do not match schema: {err}"),
        },
    };
    report_corrupt(name, &reason);
    Ok(Typed {
        records: default,
        corrupt: Some(reason),
    })
}

async fn write_collection(
    conn: &mut SqliteConnection,
    entry: &PendingWrite,
) -> Result<(), sqlx::Error> {
    let name = entry.name;
    let now = now_rfc3339();
    let existing: Option<String> =
        sqlx::query_scalar("SELECT CAST(payload AS TEXT) FROM collections WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(previous) = existing {
        let unreadable = match parse_array(&previous) {
            Err(reason) => Some(reason),
            Ok(_) => entry.schema_mismatch.clone(),
        };
        if let Some(reason) = unreadable {
            sqlx::query(
                "INSERT INTO collection_quarantine (name, payload, reason, quarantined_at) VALUES (?, ?, ?, ?)",
            )
            .bind(name.as_str())
            .bind(&previous)
            .bind(&reason)
            .bind(&now)
            .execute(&mut *conn)
            .await?;
            tracing::warn!(
                target: "ironward",
                event = "collection_quarantined",
                collection = %name,
                reason = %reason
            );
        }
    }

    sqlx::query(
        "INSERT INTO collections (name, payload, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
    )
    .bind(name.as_str())
    .bind(&entry.payload)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn parse_array(text: &str) -> Result<Vec<Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(format!("expected a JSON array, found {}", json_kind(&other))),
        Err(err) => Err(format!("invalid JSON: {err}")),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn encode<T: Serialize>(name: CollectionName, records: &[T]) -> AppResult<String> {
    serde_json::to_string(records).map_err(|err| {
        AppError::new(STORE_WRITE_FAILED, "Records could not be serialized")
            .with_context("collection", name.as_str())
            .with_cause(err)
    })
}

fn report_corrupt(name: CollectionName, reason: &str) {
    tracing::warn!(
        target: "ironward",
        event = "collection_corrupt",
        collection = %name,
        reason = %reason,
        "stored collection is unreadable; using default"
    );
}

fn read_failed(name: CollectionName, err: sqlx::Error) -> AppError {
    let error = AppError::new(STORE_READ_FAILED, "Could not read from the local database")
        .with_context("collection", name.as_str())
        .with_cause(err);
    error.log_with_event("collection_read_failed");
    error
}

fn write_failed(name: Option<CollectionName>, err: sqlx::Error) -> AppError {
    let mut error = AppError::new(
        STORE_WRITE_FAILED,
        "Changes could not be saved; the screen may not match stored data",
    )
    .with_cause(err);
    if let Some(name) = name {
        error = error.with_context("collection", name.as_str());
    }
    error.log_with_event("collection_write_failed");
    error
}

fn write_failed_any(err: sqlx::Error) -> AppError {
    write_failed(None, err)
}

//! Lamp persistence using SQLite.
//!
//! Deletes are soft: a row gets a `deleted_at` tombstone and drops out of
//! every read, but is never physically removed or revived.
//!
//! `list` translates offset/limit straight into `LIMIT`/`OFFSET`. Unlike the
//! in-memory store, two paginated calls separated by a concurrent insert or
//! delete may skip or repeat a row. This is a known limitation of offset
//! paging over a live table.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{LampRepository, Window, MAX_LIST_LIMIT};
use crate::error::{RepositoryError, RepositoryResult};
use crate::lamp::LampEntity;

/// VM instructions between cancellation checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Column list shared across queries.
const COLUMNS: &str = "id, status, created_at, updated_at";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS lamps (
        id         BLOB PRIMARY KEY,
        status     INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_lamps_live_order
        ON lamps(created_at, id) WHERE deleted_at IS NULL;
";

/// Durable lamp store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE lamps (
///     id         BLOB PRIMARY KEY,   -- 16 raw UUID bytes
///     status     INTEGER NOT NULL,
///     created_at TEXT NOT NULL,      -- RFC 3339, UTC, nanoseconds
///     updated_at TEXT NOT NULL,
///     deleted_at TEXT                -- non-NULL marks a tombstone
/// );
/// ```
///
/// Timestamps are limited to years 0000-9999, where the text is fixed width
/// and text order equals time order. SQLite
/// compares BLOBs with memcmp, so `ORDER BY created_at, id` matches
/// [`super::listing_order`].
///
/// # Deadlines
/// Every operation runs on the blocking pool and must finish within
/// `query_timeout`. On expiry, or when the caller drops the future, the
/// running statement is aborted and the caller sees `Cancelled`. The outcome of
/// a cancelled write is unknown to the caller.
pub struct SqliteLampRepository {
    conn: Arc<Mutex<Connection>>,
    query_timeout: Duration,
}

impl SqliteLampRepository {
    /// Opens (or creates) the database file and ensures the table exists.
    pub fn open<P: AsRef<Path>>(path: P, query_timeout: Duration) -> RepositoryResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, query_timeout)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory(query_timeout: Duration) -> RepositoryResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, query_timeout)
    }

    fn from_connection(conn: Connection, query_timeout: Duration) -> RepositoryResult<Self> {
        conn.busy_timeout(query_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            query_timeout,
        })
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Run `op` against the connection on the blocking pool, bounded by the
    /// store deadline.
    ///
    /// The progress handler polls this call's own abandon flag, so a timeout
    /// or a dropped future aborts the statement in flight without touching
    /// whatever runs on the connection next.
    async fn run<T, F>(&self, operation: &'static str, op: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> RepositoryResult<T> + Send + 'static,
    {
        let timeout = self.query_timeout;
        let abandoned = Arc::new(AtomicBool::new(false));
        let guard = AbandonOnDrop {
            abandoned: Arc::clone(&abandoned),
            armed: true,
        };

        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| RepositoryError::Internal("sqlite connection lock poisoned".into()))?;
            if abandoned.load(Ordering::SeqCst) {
                return Err(RepositoryError::Cancelled { operation, timeout });
            }

            let flag = Arc::clone(&abandoned);
            conn.progress_handler(
                PROGRESS_INTERVAL,
                Some(move || flag.load(Ordering::Relaxed)),
            );
            let result = op(&conn);
            conn.progress_handler(0, None::<fn() -> bool>);

            match result {
                Err(RepositoryError::Storage(e))
                    if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) =>
                {
                    Err(RepositoryError::Cancelled { operation, timeout })
                }
                other => other,
            }
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => {
                guard.disarm();
                joined.map_err(|e| {
                    RepositoryError::Internal(format!("sqlite {} task failed: {}", operation, e))
                })?
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "SQLite operation exceeded its deadline"
                );
                drop(guard);
                Err(RepositoryError::Cancelled { operation, timeout })
            }
        }
    }
}

#[async_trait]
impl LampRepository for SqliteLampRepository {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self, lamp: LampEntity) -> RepositoryResult<()> {
        let id = lamp.id;
        let (created_at, updated_at) = storable_timestamps(&lamp)?;
        self.run("create", move |conn| {
            // A live duplicate is replaced; a tombstone stays buried.
            conn.execute(
                "INSERT INTO lamps (id, status, created_at, updated_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, NULL)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at
                 WHERE lamps.deleted_at IS NULL",
                params![id.as_bytes().as_slice(), lamp.status, created_at, updated_at],
            )?;
            Ok(())
        })
        .await?;
        debug!(lamp_id = %id, "Lamp stored");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<LampEntity> {
        let raw = self
            .run("get_by_id", move |conn| {
                let query =
                    format!("SELECT {COLUMNS} FROM lamps WHERE id = ?1 AND deleted_at IS NULL");
                Ok(conn
                    .query_row(&query, params![id.as_bytes().as_slice()], RawLamp::from_row)
                    .optional()?)
            })
            .await?;
        raw.ok_or(RepositoryError::NotFound(id))?.decode()
    }

    async fn update(&self, lamp: LampEntity) -> RepositoryResult<()> {
        let id = lamp.id;
        let (created_at, updated_at) = storable_timestamps(&lamp)?;
        let changed = self
            .run("update", move |conn| {
                Ok(conn.execute(
                    "UPDATE lamps SET status = ?2, created_at = ?3, updated_at = ?4
                     WHERE id = ?1 AND deleted_at IS NULL",
                    params![id.as_bytes().as_slice(), lamp.status, created_at, updated_at],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        let deleted_at = encode_timestamp(&Utc::now());
        let changed = self
            .run("delete", move |conn| {
                Ok(conn.execute(
                    "UPDATE lamps SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                    params![id.as_bytes().as_slice(), deleted_at],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        info!(lamp_id = %id, "Lamp soft-deleted");
        Ok(())
    }

    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<LampEntity>> {
        let Some(window) = Window::new(offset, limit).map(|w| w.capped(MAX_LIST_LIMIT)) else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(window.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(window.offset).unwrap_or(i64::MAX);

        let rows = self
            .run("list", move |conn| {
                let query = format!(
                    "SELECT {COLUMNS} FROM lamps WHERE deleted_at IS NULL
                     ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2"
                );
                let mut stmt = conn.prepare(&query)?;
                let rows = stmt
                    .query_map(params![limit, offset], RawLamp::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(RawLamp::decode).collect()
    }

    async fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
        self.run("exists", move |conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM lamps WHERE id = ?1 AND deleted_at IS NULL)",
                params![id.as_bytes().as_slice()],
                |row| row.get::<_, bool>(0),
            )?)
        })
        .await
    }
}

/// Flags the operation as abandoned unless disarmed.
struct AbandonOnDrop {
    abandoned: Arc<AtomicBool>,
    armed: bool,
}

impl AbandonOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.abandoned.store(true, Ordering::SeqCst);
        }
    }
}

/// Row as stored, before validation.
struct RawLamp {
    id: Value,
    status: bool,
    created_at: Value,
    updated_at: Value,
}

impl RawLamp {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn decode(self) -> RepositoryResult<LampEntity> {
        let id = decode_id(self.id)?;
        Ok(LampEntity {
            id,
            status: self.status,
            created_at: decode_timestamp(id, "created_at", self.created_at)?,
            updated_at: decode_timestamp(id, "updated_at", self.updated_at)?,
        })
    }
}

/// Years with exactly four digits; outside this range RFC 3339 text neither
/// parses back nor sorts in time order.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Encode both stamps of `lamp`, rejecting years the column cannot hold.
fn storable_timestamps(lamp: &LampEntity) -> RepositoryResult<(String, String)> {
    for (column, ts) in [("created_at", &lamp.created_at), ("updated_at", &lamp.updated_at)] {
        if !STORABLE_YEARS.contains(&ts.year()) {
            return Err(RepositoryError::InvalidArgument(format!(
                "lamp {} {} {} is outside years 0000-9999",
                lamp.id, column, ts
            )));
        }
    }
    Ok((
        encode_timestamp(&lamp.created_at),
        encode_timestamp(&lamp.updated_at),
    ))
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_id(value: Value) -> RepositoryResult<Uuid> {
    match value {
        Value::Blob(bytes) => Uuid::from_slice(&bytes).map_err(|e| {
            RepositoryError::DataIntegrity(format!(
                "stored lamp id has {} bytes: {}",
                bytes.len(),
                e
            ))
        }),
        other => Err(RepositoryError::DataIntegrity(format!(
            "stored lamp id is {:?}, expected 16-byte blob",
            other.data_type()
        ))),
    }
}

fn decode_timestamp(id: Uuid, column: &str, value: Value) -> RepositoryResult<DateTime<Utc>> {
    match value {
        Value::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                RepositoryError::DataIntegrity(format!(
                    "lamp {} has unreadable {} {:?}: {}",
                    id, column, text, e
                ))
            }),
        other => Err(RepositoryError::DataIntegrity(format!(
            "lamp {} has {} of type {:?}",
            id,
            column,
            other.data_type()
        ))),
    }
}

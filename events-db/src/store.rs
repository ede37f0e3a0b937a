use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorInformation;
use diesel::sqlite::SqliteConnection;
use log::{error, info};

use crate::error::{StoreError, StoreResult};
use crate::models::{DbEvent, NewEtagCache, NewEvent};
use crate::repository::Repository;
use crate::schema::{etag_cache, events};

/// One persisted activity record, decoded from the store's text `payload`
/// column back into structured JSON.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub repo_name: String,
    pub actor_login: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub collected_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        repo_name: impl Into<String>,
        actor_login: impl Into<String>,
        created_at: DateTime<Utc>,
        payload: serde_json::Value,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            repo_name: repo_name.into(),
            actor_login: actor_login.into(),
            created_at,
            payload,
            collected_at,
        }
    }
}

fn db_event_to_event(db: DbEvent) -> StoreResult<Event> {
    let payload = serde_json::from_str(&db.payload).map_err(StoreError::InvalidPayload)?;
    Ok(Event {
        id: db.id,
        event_type: db.event_type,
        repo_name: db.repo_name,
        actor_login: db.actor_login,
        created_at: db.created_at.and_utc(),
        payload,
        collected_at: db.collected_at.and_utc(),
    })
}

/// The event store: schema owner, sole writer, and the handle the
/// repository layer reads through. Wraps a single connection behind a
/// mutex — SQLite serializes writers regardless of pool size, so pooling
/// the writer side buys nothing, and reads at this workload's volume are
/// cheap enough to share the same handle.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Store {
    /// Opens (creating if absent) the SQLite file at `database_path` and
    /// applies any pending migrations. Idempotent: safe to call on every
    /// process startup.
    pub fn initialize(database_path: &str) -> StoreResult<Self> {
        let mut conn = SqliteConnection::establish(database_path).map_err(StoreError::Connect)?;

        diesel::sql_query("PRAGMA journal_mode = WAL;")
            .execute(&mut conn)
            .map_err(StoreError::Query)?;
        diesel::sql_query("PRAGMA busy_timeout = 5000;")
            .execute(&mut conn)
            .map_err(StoreError::Query)?;
        diesel::sql_query("PRAGMA foreign_keys = ON;")
            .execute(&mut conn)
            .map_err(StoreError::Query)?;

        crate::migrations::run_pending_migrations(&mut conn)?;

        info!("Event store initialized at {database_path}");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests that don't want a file on disk.
    #[cfg(any(test, feature = "test-util"))]
    pub fn initialize_in_memory() -> StoreResult<Self> {
        Self::initialize(":memory:")
    }

    /// Inserts a batch of events in a single transaction. Duplicates on
    /// `id` are silently skipped and not counted. If the commit fails the
    /// whole batch is discarded — callers must not advance the entity tag
    /// in that case.
    pub fn insert_events(&self, batch: &[Event]) -> StoreResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let new_events: Vec<NewEvent> = batch
            .iter()
            .map(|e| NewEvent {
                id: &e.id,
                event_type: &e.event_type,
                repo_name: &e.repo_name,
                actor_login: &e.actor_login,
                created_at: e.created_at.naive_utc(),
                payload: e.payload.to_string(),
                collected_at: e.collected_at.naive_utc(),
            })
            .collect();

        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let result = conn.transaction::<usize, diesel::result::Error, _>(|conn| {
            diesel::insert_or_ignore_into(events::table)
                .values(&new_events)
                .execute(conn)
        });

        match result {
            Ok(inserted) => Ok(inserted),
            Err(err) => {
                error!("Batch insert failed, entity tag will not be advanced: {err}");
                Err(StoreError::Query(err))
            }
        }
    }

    pub fn get_etag(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        etag_cache::table
            .find(key)
            .select(etag_cache::etag)
            .first::<Option<String>>(&mut *conn)
            .optional()
            .map(Option::flatten)
            .map_err(StoreError::Query)
    }

    pub fn put_etag(&self, key: &str, etag: Option<&str>, at: DateTime<Utc>) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let row = NewEtagCache {
            key,
            etag,
            last_poll_at: at.naive_utc(),
        };

        diesel::insert_into(etag_cache::table)
            .values(&row)
            .on_conflict(etag_cache::key)
            .do_update()
            .set(&row)
            .execute(&mut *conn)
            .map(|_| ())
            .map_err(StoreError::Query)
    }

    pub fn last_poll_at(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        etag_cache::table
            .find(key)
            .select(etag_cache::last_poll_at)
            .first::<NaiveDateTime>(&mut *conn)
            .optional()
            .map(|opt| opt.map(|naive| naive.and_utc()))
            .map_err(StoreError::Query)
    }

    /// Hands the repository layer a read-only-by-convention handle onto the
    /// same connection. The repository never issues writes.
    pub fn open_read(&self) -> Repository {
        Repository::new(self.conn.clone())
    }

    /// Liveness check for `/health`: confirms the migrated schema is actually
    /// present, distinct from a plain query failure. `initialize` always runs
    /// migrations before handing out a `Store`, so this only trips if the
    /// backing file was removed or truncated out from under a running
    /// process.
    pub fn is_ready(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        match events::table.count().get_result::<i64>(&mut *conn) {
            Ok(_) => Ok(()),
            Err(diesel::result::Error::DatabaseError(_, info))
                if info.message().contains("no such table") =>
            {
                Err(StoreError::NotInitialized)
            }
            Err(err) => Err(StoreError::Query(err)),
        }
    }
}

pub(crate) fn rows_to_events(rows: Vec<DbEvent>) -> StoreResult<Vec<Event>> {
    rows.into_iter().map(db_event_to_event).collect()
}

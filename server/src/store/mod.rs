/// Offline store.
/// Durable append-only log of envelopes, queried per participant pair so
/// offline receivers can recover their backlog.
pub mod init;
pub mod models;

use crate::auth::Identity;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use models::{Envelope, NewEnvelope};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DbPool = Arc<Mutex<Connection>>;

/// Create an in-memory database for testing
pub fn create_test_pool() -> DbPool {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory DB");
    init::initialize_database(&conn).expect("Failed to initialize DB");
    Arc::new(Mutex::new(conn))
}

/// Durable append/query capability used by the relay
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Persist an envelope. Errors are always reported, never swallowed.
    async fn append(&self, envelope: NewEnvelope) -> Result<Envelope, StoreError>;

    /// All envelopes exchanged between `a` and `b` in either direction,
    /// ascending by timestamp.
    async fn query(&self, a: &Identity, b: &Identity) -> Result<Vec<Envelope>, StoreError>;
}

/// Wall-clock milliseconds, strictly increasing across calls
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock::default()
    }

    /// Clock whose first value is greater than `last`
    pub fn starting_after(last: i64) -> Self {
        MonotonicClock {
            last: AtomicI64::new(last),
        }
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    clock: Arc<MonotonicClock>,
}

impl SqliteStore {
    /// Wrap an initialised connection. The clock resumes after the newest
    /// stored timestamp so a lagging wall clock cannot reorder history.
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        let newest = latest_timestamp(&conn)?;
        Ok(SqliteStore {
            pool: Arc::new(Mutex::new(conn)),
            clock: Arc::new(MonotonicClock::starting_after(newest)),
        })
    }

    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        init::initialize_database(&conn)?;
        SqliteStore::new(conn)
    }

    pub fn in_memory() -> Self {
        SqliteStore {
            pool: create_test_pool(),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn latest_timestamp(conn: &Connection) -> SqliteResult<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(timestamp), 0) FROM envelopes",
        [],
        |row| row.get(0),
    )
}

#[async_trait]
impl OfflineStore for SqliteStore {
    async fn append(&self, envelope: NewEnvelope) -> Result<Envelope, StoreError> {
        let conn = self.pool.lock().await;
        let timestamp = envelope.timestamp.unwrap_or_else(|| self.clock.next());

        conn.execute(
            "INSERT INTO envelopes (sender, receiver, ciphertext, iv, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                envelope.sender.as_str(),
                envelope.receiver.as_str(),
                &envelope.ciphertext,
                &envelope.iv,
                timestamp
            ],
        )?;

        Ok(Envelope {
            id: conn.last_insert_rowid(),
            sender: envelope.sender,
            receiver: envelope.receiver,
            ciphertext: envelope.ciphertext,
            iv: envelope.iv,
            timestamp,
        })
    }

    async fn query(&self, a: &Identity, b: &Identity) -> Result<Vec<Envelope>, StoreError> {
        let conn = self.pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT id, sender, receiver, ciphertext, iv, timestamp FROM envelopes
             WHERE (sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1)
             ORDER BY timestamp ASC, id ASC",
        )?;

        let envelopes = stmt
            .query_map(params![a.as_str(), b.as_str()], |row| {
                Ok(Envelope {
                    id: row.get(0)?,
                    sender: Identity::from(row.get::<_, String>(1)?),
                    receiver: Identity::from(row.get::<_, String>(2)?),
                    ciphertext: row.get(3)?,
                    iv: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(envelopes)
    }
}

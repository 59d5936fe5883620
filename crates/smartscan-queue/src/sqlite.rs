// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable message transport backed by SQLite.
//
// Every channel is a row in `channels`; messages live in a single `messages`
// table keyed by channel.  A receive claims the oldest visible message by
// stamping a lock token and an expiry on it (peek-lock).  Completing the
// delivery deletes the row; an expired lock makes the message visible again.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use smartscan_core::QueueMessage;
use smartscan_core::error::{Result, SmartScanError};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::integrity::hash_bytes;
use crate::transport::{Delivery, MessageTransport};

/// SQLite schema for channels and messages.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS channels (
        name TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel TEXT NOT NULL REFERENCES channels(name),
        payload BLOB,
        payload_hash TEXT,
        enqueued_at TEXT NOT NULL,
        lock_token TEXT,
        locked_until INTEGER
    );
    CREATE INDEX IF NOT EXISTS messages_by_channel ON messages(channel, id);
"#;

/// How long a received message stays invisible to other receivers.
const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);

/// How often a pending receive re-checks the table.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Message transport stored in a local SQLite database.
///
/// `rusqlite` is synchronous, so every statement runs on
/// `tokio::task::spawn_blocking` behind a mutex-guarded connection.
pub struct SqliteTransport {
    conn: Arc<Mutex<Connection>>,
    lock_duration: Duration,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl SqliteTransport {
    /// Open (or create) the queue database at the given path.
    ///
    /// Applies WAL journal mode so several service instances can share one
    /// queue file, and creates the tables if they do not exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| SmartScanError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| SmartScanError::Database(format!("WAL pragma: {e}")))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| SmartScanError::Database(format!("busy timeout: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| SmartScanError::Database(format!("create tables: {e}")))?;

        info!("message queue database opened");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SmartScanError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| SmartScanError::Database(format!("create tables: {e}")))?;

        debug!("in-memory message queue opened");
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            lock_duration: DEFAULT_LOCK_DURATION,
            poll_interval: DEFAULT_POLL_INTERVAL,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Number of messages on a channel, locked or not.
    pub async fn depth(&self, channel: &str) -> Result<u64> {
        let channel = channel.to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel = ?1",
                params![channel],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| SmartScanError::Database(format!("count messages: {e}")))
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(SmartScanError::Queue("transport is closed".into()));
        }

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| SmartScanError::Database("connection lock poisoned".into()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| SmartScanError::Queue(format!("blocking task: {e}")))?
    }

    /// Claim the oldest visible message on `channel`, if any.
    async fn try_claim(&self, channel: &str) -> Result<Option<Delivery>> {
        let channel = channel.to_owned();
        let lock_ms = self.lock_duration.as_millis() as i64;

        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| SmartScanError::Database(format!("begin claim: {e}")))?;

            require_channel(&tx, &channel)?;

            let now_ms = Utc::now().timestamp_millis();
            let row = tx
                .query_row(
                    "SELECT id, payload, payload_hash, enqueued_at FROM messages
                     WHERE channel = ?1 AND (lock_token IS NULL OR locked_until < ?2)
                     ORDER BY id ASC LIMIT 1",
                    params![channel, now_ms],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<Vec<u8>>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| SmartScanError::Database(format!("select message: {e}")))?;

            let Some((id, payload, payload_hash, enqueued_at)) = row else {
                return Ok(None);
            };

            let lock_token = Uuid::new_v4().to_string();
            tx.execute(
                "UPDATE messages SET lock_token = ?1, locked_until = ?2 WHERE id = ?3",
                params![lock_token, now_ms + lock_ms, id],
            )
            .map_err(|e| SmartScanError::Database(format!("lock message: {e}")))?;

            tx.commit()
                .map_err(|e| SmartScanError::Database(format!("commit claim: {e}")))?;

            let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|e| {
                    warn!(id, error = %e, "unparseable enqueue time");
                    Utc::now()
                });

            Ok(Some(Delivery {
                id,
                channel,
                lock_token,
                payload,
                payload_hash,
                enqueued_at,
            }))
        })
        .await
    }
}

/// Fail with `UnknownChannel` unless the channel was created.
fn require_channel(conn: &Connection, channel: &str) -> Result<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM channels WHERE name = ?1",
            params![channel],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| SmartScanError::Database(format!("lookup channel: {e}")))?;

    match exists {
        Some(()) => Ok(()),
        None => Err(SmartScanError::UnknownChannel(channel.to_owned())),
    }
}

#[async_trait]
impl MessageTransport for SqliteTransport {
    #[instrument(skip(self))]
    async fn ensure_channel(&self, channel: &str) -> Result<()> {
        let channel = channel.to_owned();
        self.with_conn(move |conn| {
            let created = conn
                .execute(
                    "INSERT OR IGNORE INTO channels (name, created_at) VALUES (?1, ?2)",
                    params![channel, Utc::now().to_rfc3339()],
                )
                .map_err(|e| SmartScanError::Database(format!("create channel: {e}")))?;
            if created > 0 {
                info!(channel = %channel, "queue channel created");
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, message), fields(bytes = message.payload.len()))]
    async fn send(&self, channel: &str, message: QueueMessage) -> Result<()> {
        let channel = channel.to_owned();
        self.with_conn(move |conn| {
            require_channel(conn, &channel)?;
            let hash = hash_bytes(&message.payload);
            conn.execute(
                "INSERT INTO messages (channel, payload, payload_hash, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![channel, message.payload, hash, Utc::now().to_rfc3339()],
            )
            .map_err(|e| SmartScanError::Database(format!("insert message: {e}")))?;
            debug!(channel = %channel, "message sent");
            Ok(())
        })
        .await
    }

    async fn receive(&self, channel: &str, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_claim(channel).await? {
                debug!(channel, id = delivery.id, "message received");
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    #[instrument(skip(self, delivery), fields(id = delivery.id))]
    async fn complete(&self, delivery: &Delivery) -> Result<()> {
        let id = delivery.id;
        let token = delivery.lock_token.clone();
        self.with_conn(move |conn| {
            let rows = conn
                .execute(
                    "DELETE FROM messages WHERE id = ?1 AND lock_token = ?2",
                    params![id, token],
                )
                .map_err(|e| SmartScanError::Database(format!("complete message: {e}")))?;
            if rows == 0 {
                return Err(SmartScanError::Queue(format!(
                    "message {id} is no longer locked by this receiver"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("message queue closed");
        }
        Ok(())
    }
}

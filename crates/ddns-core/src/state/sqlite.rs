// # SQLite State Store
//
// Durable implementation of StateStore backed by a single SQLite file.
//
// ## Layout
//
// ```sql
// update_history(id INTEGER PRIMARY KEY AUTOINCREMENT, target_id, status,
//                message, response_code, ip_address, created_at)
// cache(key TEXT PRIMARY KEY, value, updated_at)
// ```
//
// ## Concurrency
//
// The database runs in WAL mode so read-only observers (a dashboard listing
// recent history, for example) never block the agent and never see a
// half-written row. The agent holds a single connection: it is the only
// writer and issues one statement at a time.
//
// ## Crash Behavior
//
// Every call is its own transaction and commits before returning. A crash
// between two calls leaves at most the later write missing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::traits::state_store::{CacheEntry, StateStore, UpdateRecord, UpdateStatus};
use crate::Error;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS update_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT NOT NULL,
        response_code INTEGER,
        ip_address TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_update_history_created_at
        ON update_history (created_at)",
    "CREATE TABLE IF NOT EXISTS cache (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
];

/// SQLite-backed state store
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStateStore {
    /// Open (creating if needed) the database at `path`
    ///
    /// Creates the parent directory and both tables when they do not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("State store opened at {}", path.display());
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn log_update(&self, record: &UpdateRecord) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO update_history
                (target_id, status, message, response_code, ip_address, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.target_id)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(record.response_code.map(i64::from))
        .bind(record.ip_address.as_deref())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        debug!(
            "Recorded {} for target {}",
            record.status, record.target_id
        );
        Ok(())
    }

    async fn cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let row = sqlx::query("SELECT key, value, updated_at FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<CacheEntry, Error> {
            Ok(CacheEntry {
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            })
        })
        .transpose()
    }

    async fn set_cache(&self, key: &str, value: &str) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO cache (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_updates(&self, limit: usize) -> Result<Vec<UpdateRecord>, Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT target_id, status, message, response_code, ip_address, created_at
             FROM update_history
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<UpdateRecord, Error> {
                let status: String = row.try_get("status")?;
                let status = UpdateStatus::parse(&status).ok_or_else(|| {
                    Error::state_store(format!("Unknown status '{status}' in update_history"))
                })?;
                let response_code: Option<i64> = row.try_get("response_code")?;

                Ok(UpdateRecord {
                    target_id: row.try_get("target_id")?,
                    status,
                    message: row.try_get("message")?,
                    response_code: response_code.and_then(|code| u16::try_from(code).ok()),
                    ip_address: row.try_get("ip_address")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }

    async fn close(&self) -> Result<(), Error> {
        self.pool.close().await;
        debug!("State store closed");
        Ok(())
    }
}

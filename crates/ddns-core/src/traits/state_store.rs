// # State Store Trait
//
// Defines the interface for durable agent state.
//
// ## Purpose
//
// The state store holds two areas:
// - `update_history`: an append-only log of every update attempt
// - `cache`: a small key/value map used for IP-change detection
//   (`last_ip`) and per-target de-duplication (`last_ip:<target_id>`)
//
// Records are write-once. Cache entries are overwritten in place and carry
// the time of their last write.
//
// ## Implementations
//
// - SQLite: `state::SqliteStateStore` (production)
// - In-memory: `state::MemoryStateStore` (tests, embedding)
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::{StateStore, UpdateRecord, UpdateStatus};
//
// let store = /* StateStore implementation */;
// store.set_cache("last_ip", "198.51.100.7").await?;
// store
//     .log_update(&UpdateRecord::new("7", UpdateStatus::Success, "good", Some(200), None))
//     .await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Success,
    Error,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Success => "success",
            UpdateStatus::Error => "error",
        }
    }

    /// Parse the persisted representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(UpdateStatus::Success),
            "error" => Some(UpdateStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the update history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub target_id: String,
    pub status: UpdateStatus,
    /// Provider-derived free text. Never contains a decrypted token.
    pub message: String,
    pub response_code: Option<u16>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UpdateRecord {
    /// Create a record stamped with the current time
    pub fn new(
        target_id: impl Into<String>,
        status: UpdateStatus,
        message: impl Into<String>,
        response_code: Option<u16>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            status,
            message: message.into(),
            response_code,
            ip_address,
            created_at: Utc::now(),
        }
    }

    /// Create an error record from a failed attempt
    pub fn failure(target_id: &str, err: &crate::Error, ip_address: Option<&str>) -> Self {
        Self::new(
            target_id,
            UpdateStatus::Error,
            err.record_message(),
            err.response_code(),
            ip_address.map(str::to_string),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == UpdateStatus::Success
    }
}

/// A cache value with the time it was last written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Trait for state store implementations
///
/// Every call commits before returning; no transaction spans several calls.
/// The runtime is the only writer. Implementations must tolerate external
/// read-only observers of the history.
///
/// # Errors
///
/// Storage faults are returned as [`crate::Error::StateStore`] and are never
/// swallowed.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Durably append one update record
    async fn log_update(&self, record: &UpdateRecord) -> Result<(), crate::Error>;

    /// Get a cache entry with its timestamp
    ///
    /// # Returns
    ///
    /// - `Ok(Some(CacheEntry))`: The entry
    /// - `Ok(None)`: No entry for this key
    /// - `Err(Error)`: Storage error
    async fn cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, crate::Error>;

    /// Insert or overwrite a cache value, refreshing its timestamp
    async fn set_cache(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Newest-first slice of the update history
    async fn recent_updates(&self, limit: usize) -> Result<Vec<UpdateRecord>, crate::Error>;

    /// Release the underlying storage
    ///
    /// Called once when the runtime stops.
    async fn close(&self) -> Result<(), crate::Error>;

    /// Get a cache value
    ///
    /// A read of an absent key returns `Ok(None)`.
    async fn get_cache(&self, key: &str) -> Result<Option<String>, crate::Error> {
        Ok(self.cache_entry(key).await?.map(|entry| entry.value))
    }
}

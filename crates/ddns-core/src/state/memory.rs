// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a fast state store that doesn't persist across restarts. Useful
// for tests and for embedding the runtime where history is not needed after
// the process exits.
//
// ## Crash Behavior
//
// - All history and cache entries are lost on restart
// - The first cycle after a restart treats the public IP as changed and
//   attempts every target

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::state_store::{CacheEntry, StateStore, UpdateRecord};
use crate::Error;

#[derive(Debug, Default)]
struct Inner {
    history: Vec<UpdateRecord>,
    cache: HashMap<String, CacheEntry>,
}

/// In-memory state store implementation
///
/// Clones share the same underlying state, so a test can keep a handle
/// while the runtime owns another.
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::MemoryStateStore;
/// use ddns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     store.set_cache("last_ip", "198.51.100.7").await?;
///     assert_eq!(store.get_cache("last_ip").await?.as_deref(), Some("198.51.100.7"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Full history, oldest first
    pub async fn history(&self) -> Vec<UpdateRecord> {
        self.inner.read().await.history.clone()
    }

    /// Snapshot of every cache value
    pub async fn cache_snapshot(&self) -> HashMap<String, String> {
        self.inner
            .read()
            .await
            .cache
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn log_update(&self, record: &UpdateRecord) -> Result<(), Error> {
        self.inner.write().await.history.push(record.clone());
        Ok(())
    }

    async fn cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        Ok(self.inner.read().await.cache.get(key).cloned())
    }

    async fn set_cache(&self, key: &str, value: &str) -> Result<(), Error> {
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: Utc::now(),
        };
        self.inner.write().await.cache.insert(key.to_string(), entry);
        Ok(())
    }

    async fn recent_updates(&self, limit: usize) -> Result<Vec<UpdateRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.history.iter().rev().take(limit).cloned().collect())
    }

    async fn close(&self) -> Result<(), Error> {
        // Nothing to release
        Ok(())
    }
}

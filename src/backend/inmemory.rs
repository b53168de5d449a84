//! In-memory store backend (default, thread-safe, async).
//!
//! Uses DashMap for concurrent access with per-key sharding. Conditional
//! writes happen while holding the shard lock for that key, which makes
//! compare-and-swap atomic.

use super::{StoreBackend, StoredEntry};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe async in-memory store backend.
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```no_run
/// use billpay_kit::backend::{InMemoryBackend, StoreBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     let rev = backend.insert_new("invoice:INV-2024-0117", b"v1".to_vec()).await?;
///     let rev = backend
///         .compare_and_swap("invoice:INV-2024-0117", b"v2".to_vec(), rev)
///         .await?;
///     assert_eq!(rev, 2);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, StoredEntry>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Get the current number of entries.
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let found = self.store.get(key).map(|entry| entry.value().clone());
        debug!(
            "InMemory GET {} -> {}",
            key,
            if found.is_some() { "HIT" } else { "MISS" }
        );
        Ok(found)
    }

    async fn insert_new(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(_) => {
                debug!("InMemory INSERT {} -> EXISTS", key);
                Err(Error::Conflict(format!("key already exists: {}", key)))
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredEntry {
                    bytes: value,
                    revision: 1,
                });
                debug!("InMemory INSERT {} (rev 1)", key);
                Ok(1)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: Vec<u8>,
        expected_revision: u64,
    ) -> Result<u64> {
        let mut entry = self
            .store
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        if entry.revision != expected_revision {
            debug!(
                "InMemory CAS {} -> STALE (expected rev {}, found {})",
                key, expected_revision, entry.revision
            );
            return Err(Error::Conflict(format!(
                "{} is at revision {}, expected {}",
                key, entry.revision, expected_revision
            )));
        }

        entry.bytes = value;
        entry.revision += 1;
        debug!("InMemory CAS {} (rev {})", key, entry.revision);
        Ok(entry.revision)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("InMemory DELETE {}", key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, StoredEntry)>> {
        let results: Vec<(String, StoredEntry)> = self
            .store
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        debug!("InMemory SCAN {}* -> {} entries", prefix, results.len());
        Ok(results)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

//! Store backend implementations.

use crate::error::Result;

pub mod inmemory;

pub use inmemory::InMemoryBackend;

/// Bytes stored under a key together with their revision.
///
/// Revisions start at 1 on insert and increase by one on every successful
/// compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEntry {
    pub bytes: Vec<u8>,
    pub revision: u64,
}

/// Trait for store backend implementations.
///
/// Abstracts byte-level storage so the payment-link store can sit on any
/// key/value engine that offers a conditional write. Implementations: InMemory
/// (default), a SQL table with a `revision` column, Redis with `WATCH`, etc.
///
/// **IMPORTANT:** All methods use `&self` to allow concurrent access.
/// Backend implementations should use interior mutability.
///
/// **ASYNC:** All methods are async and must be awaited.
#[allow(async_fn_in_trait)]
pub trait StoreBackend: Send + Sync + Clone {
    /// Retrieve the entry stored under `key`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Store a value under a key that must not exist yet.
    ///
    /// Returns the initial revision (1).
    ///
    /// # Errors
    /// `Error::Conflict` if the key already exists
    async fn insert_new(&self, key: &str, value: Vec<u8>) -> Result<u64>;

    /// Replace the value only if its current revision is `expected_revision`.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    /// - `Error::NotFound` if the key does not exist
    /// - `Error::Conflict` if the revision moved on
    async fn compare_and_swap(&self, key: &str, value: Vec<u8>, expected_revision: u64)
        -> Result<u64>;

    /// Remove value from the store.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete(&self, key: &str) -> Result<()>;

    /// All entries whose key starts with `prefix` (optional).
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if the scan fails
    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, StoredEntry)>> {
        Err(crate::error::Error::NotImplemented(
            "scan_prefix not implemented for this backend".to_string(),
        ))
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

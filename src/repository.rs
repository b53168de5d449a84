//! Receivables repository trait for abstracting the ledger source.
//!
//! `ReceivablesRepository` decouples the summary and list operations from the
//! system that owns invoices. Implement it over the ERP database in production;
//! use [`InMemoryReceivablesRepository`] for tests and demos.
//!
//! ```
//! use billpay_kit::repository::InMemoryReceivablesRepository;
//!
//! let repo = InMemoryReceivablesRepository::new();
//! assert!(repo.is_empty());
//! ```
//!
//! Return `Err` for connectivity, timeout or decoding failures; a missing
//! receivable is `Ok(None)`, not an error.
//!
//! Every stored receivable carries a revision so payments can be recorded with
//! compare-and-swap (`UPDATE ... WHERE revision = $n` in SQL).

use crate::error::{Error, Result};
use crate::receivable::{BranchScope, Receivable};
use crate::store::Versioned;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Trait for receivables sources.
#[allow(async_fn_in_trait)]
pub trait ReceivablesRepository: Send + Sync {
    /// Fetch a receivable by ID together with its revision.
    ///
    /// # Errors
    /// Returns `Err` if the source is unavailable
    async fn fetch_versioned(&self, id: &str) -> Result<Option<Versioned<Receivable>>>;

    /// Fetch a receivable by ID.
    ///
    /// # Errors
    /// Returns `Err` if the source is unavailable
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Receivable>> {
        Ok(self.fetch_versioned(id).await?.map(|v| v.record))
    }

    /// Consistent snapshot of every receivable.
    ///
    /// # Errors
    /// Returns `Err` if the source is unavailable
    async fn fetch_all(&self) -> Result<Vec<Receivable>>;

    /// Receivables in `scope`.
    ///
    /// Default implementation filters `fetch_all()`. Override to push the
    /// filter down (e.g. SQL `WHERE branch = $1`).
    ///
    /// # Errors
    /// Returns `Err` if the source is unavailable
    async fn fetch_by_branch(&self, scope: &BranchScope) -> Result<Vec<Receivable>> {
        let all = self.fetch_all().await?;
        Ok(all.into_iter().filter(|r| scope.includes(r)).collect())
    }

    /// Insert or replace a receivable unconditionally (imports, seeding).
    ///
    /// # Errors
    /// Returns `Err` if the write fails
    async fn upsert(&self, receivable: Receivable) -> Result<()>;

    /// Replace a receivable only if it is still at `expected_revision`.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    /// - `Error::NotFound` if the receivable does not exist
    /// - `Error::Conflict` if another writer saved first
    async fn compare_and_swap(&self, receivable: Receivable, expected_revision: u64) -> Result<u64>;

    /// Count receivables (optional, for statistics).
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if the source is unavailable
    async fn count(&self) -> Result<u64> {
        Err(crate::error::Error::NotImplemented(
            "count not implemented".to_string(),
        ))
    }
}

/// DashMap-backed repository. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryReceivablesRepository {
    data: Arc<DashMap<String, Versioned<Receivable>>>,
}

impl InMemoryReceivablesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository pre-populated with `receivables`.
    pub fn with_receivables(receivables: impl IntoIterator<Item = Receivable>) -> Self {
        let repo = Self::new();
        for r in receivables {
            repo.data.insert(
                r.id.clone(),
                Versioned {
                    record: r,
                    revision: 1,
                },
            );
        }
        repo
    }

    /// Load a JSON array of receivables (seed data).
    ///
    /// # Errors
    /// `Error::ConfigError` for malformed JSON, `Error::ValidationError` for
    /// receivables with inconsistent amounts.
    pub fn from_json(json: &str) -> Result<Self> {
        let receivables: Vec<Receivable> = serde_json::from_str(json)?;
        for r in &receivables {
            r.validate()?;
        }
        Ok(Self::with_receivables(receivables))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}

impl ReceivablesRepository for InMemoryReceivablesRepository {
    async fn fetch_versioned(&self, id: &str) -> Result<Option<Versioned<Receivable>>> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    /// Sorted by due date, then id, so lists render in a stable order.
    async fn fetch_all(&self) -> Result<Vec<Receivable>> {
        let mut all: Vec<Receivable> = self.data.iter().map(|r| r.record.clone()).collect();
        all.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn upsert(&self, receivable: Receivable) -> Result<()> {
        receivable.validate()?;
        debug!("Receivable UPSERT {}", receivable.id);
        match self.data.entry(receivable.id.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                current.record = receivable;
                current.revision += 1;
            }
            Entry::Vacant(slot) => {
                slot.insert(Versioned {
                    record: receivable,
                    revision: 1,
                });
            }
        }
        Ok(())
    }

    async fn compare_and_swap(&self, receivable: Receivable, expected_revision: u64) -> Result<u64> {
        receivable.validate()?;
        let mut current = self
            .data
            .get_mut(&receivable.id)
            .ok_or_else(|| Error::NotFound(format!("receivable {}", receivable.id)))?;

        if current.revision != expected_revision {
            debug!(
                "Receivable CAS {} -> STALE (expected rev {}, found {})",
                receivable.id, expected_revision, current.revision
            );
            return Err(Error::Conflict(format!(
                "receivable {} is at revision {}, expected {}",
                receivable.id, current.revision, expected_revision
            )));
        }

        current.record = receivable;
        current.revision += 1;
        debug!("Receivable CAS {} (rev {})", current.record.id, current.revision);
        Ok(current.revision)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

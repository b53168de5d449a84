//! Typed payment-link storage over a byte-level [`StoreBackend`].
//!
//! Layout:
//!
//! ```text
//! payment_link:<uuid>          -> envelope-encoded PaymentLink (revisioned)
//! payment_link_token:<token>   -> link uuid (token uniqueness index)
//! payment_link_invoice:<id>    -> link uuid, or empty (single-active-link claim)
//! ```
//!
//! The token index entry is created with `insert_new` before the link itself,
//! so two links can never share a token.
//!
//! The invoice claim is never deleted. Releasing it writes an empty value, so
//! its revision only grows and a stale compare-and-swap can never succeed
//! against a claim that was released and taken again.

use crate::backend::{StoreBackend, StoredEntry};
use crate::entity::Record;
use crate::error::{Error, Result};
use crate::key::RecordKeyBuilder;
use crate::link::PaymentLink;
use uuid::Uuid;

const TOKEN_INDEX_PREFIX: &str = "payment_link_token";
const INVOICE_CLAIM_PREFIX: &str = "payment_link_invoice";

/// A record together with the store revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub revision: u64,
}

/// Holder of an invoice's single-active-link claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceClaim {
    /// Link holding the claim; `None` once released.
    pub holder: Option<Uuid>,
    pub revision: u64,
}

fn parse_link_id(bytes: &[u8]) -> Option<Uuid> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn decode_entry<T: Record>(entry: StoredEntry) -> Result<Versioned<T>> {
    let record = T::decode(&entry.bytes)?;
    record.validate()?;
    Ok(Versioned {
        record,
        revision: entry.revision,
    })
}

/// Payment-link repository with compare-and-swap saves.
#[derive(Clone)]
pub struct PaymentLinkStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> PaymentLinkStore<B> {
    pub fn new(backend: B) -> Self {
        PaymentLinkStore { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn link_key(id: &Uuid) -> String {
        RecordKeyBuilder::build::<PaymentLink>(id)
    }

    fn token_key(token: &str) -> String {
        RecordKeyBuilder::build_composite(&[TOKEN_INDEX_PREFIX, token])
    }

    fn claim_key(invoice_id: &str) -> String {
        RecordKeyBuilder::build_composite(&[INVOICE_CLAIM_PREFIX, invoice_id])
    }

    /// Store a new link at revision 1.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` if the token or the id is already taken.
    pub async fn insert(&self, link: &PaymentLink) -> Result<Versioned<PaymentLink>> {
        link.validate()?;
        let bytes = link.encode()?;
        let token_key = Self::token_key(&link.token);

        self.backend
            .insert_new(&token_key, link.id.to_string().into_bytes())
            .await
            .map_err(|e| match e {
                Error::Conflict(_) => Error::Conflict(format!("token {} already in use", link.token)),
                other => other,
            })?;

        match self.backend.insert_new(&Self::link_key(&link.id), bytes).await {
            Ok(revision) => Ok(Versioned {
                record: link.clone(),
                revision,
            }),
            Err(e) => {
                if let Err(cleanup) = self.backend.delete(&token_key).await {
                    warn!("Failed to release token index {}: {}", token_key, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn fetch_by_id(&self, id: &Uuid) -> Result<Option<Versioned<PaymentLink>>> {
        match self.backend.get(&Self::link_key(id)).await? {
            Some(entry) => decode_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    pub async fn fetch_by_token(&self, token: &str) -> Result<Option<Versioned<PaymentLink>>> {
        let Some(entry) = self.backend.get(&Self::token_key(token)).await? else {
            return Ok(None);
        };

        let id = parse_link_id(&entry.bytes)
            .ok_or_else(|| Error::InvalidRecord(format!("corrupt token index for {}", token)))?;

        self.fetch_by_id(&id).await
    }

    /// Every link generated for `invoice_id`, oldest first.
    ///
    /// # Errors
    ///
    /// `Error::NotImplemented` if the backend cannot scan by prefix.
    pub async fn fetch_by_invoice(&self, invoice_id: &str) -> Result<Vec<Versioned<PaymentLink>>> {
        let prefix = RecordKeyBuilder::prefix::<PaymentLink>();
        let mut links = Vec::new();
        for (_, entry) in self.backend.scan_prefix(&prefix).await? {
            let versioned: Versioned<PaymentLink> = decode_entry(entry)?;
            if versioned.record.invoice_id == invoice_id {
                links.push(versioned);
            }
        }
        links.sort_by_key(|v| v.record.created_at);
        Ok(links)
    }

    /// Save `link` if it is still at `expected_revision`; returns the new revision.
    ///
    /// # Errors
    ///
    /// - `Error::Conflict` if another writer saved first
    /// - `Error::NotFound` if the link was never inserted
    pub async fn save(&self, link: &PaymentLink, expected_revision: u64) -> Result<u64> {
        link.validate()?;
        let bytes = link.encode()?;
        self.backend
            .compare_and_swap(&Self::link_key(&link.id), bytes, expected_revision)
            .await
    }

    /// Current claim on `invoice_id`, if one was ever taken.
    pub async fn fetch_invoice_claim(&self, invoice_id: &str) -> Result<Option<InvoiceClaim>> {
        let Some(entry) = self.backend.get(&Self::claim_key(invoice_id)).await? else {
            return Ok(None);
        };

        let holder = if entry.bytes.is_empty() {
            None
        } else {
            let id = parse_link_id(&entry.bytes).ok_or_else(|| {
                Error::InvalidRecord(format!("corrupt invoice claim for {}", invoice_id))
            })?;
            Some(id)
        };

        Ok(Some(InvoiceClaim {
            holder,
            revision: entry.revision,
        }))
    }

    /// Point the claim on `invoice_id` at `link_id`.
    ///
    /// `expected_revision` is the revision of the claim being taken over, or
    /// `None` when no claim exists yet. Returns the claim's new revision.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` if another generation moved the claim first.
    pub async fn claim_invoice(
        &self,
        invoice_id: &str,
        link_id: &Uuid,
        expected_revision: Option<u64>,
    ) -> Result<u64> {
        let key = Self::claim_key(invoice_id);
        let value = link_id.to_string().into_bytes();
        match expected_revision {
            None => self.backend.insert_new(&key, value).await,
            Some(revision) => self.backend.compare_and_swap(&key, value, revision).await,
        }
    }

    /// Release the claim on `invoice_id` if it is still at `expected_revision`.
    ///
    /// # Errors
    ///
    /// `Error::Conflict` if the claim moved on since it was read.
    pub async fn release_invoice_claim(&self, invoice_id: &str, expected_revision: u64) -> Result<u64> {
        self.backend
            .compare_and_swap(&Self::claim_key(invoice_id), Vec::new(), expected_revision)
            .await
    }
}

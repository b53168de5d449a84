//! Core record trait for everything kept in a store backend.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;

/// Trait that all records persisted through a [`StoreBackend`](crate::backend::StoreBackend)
/// must implement.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use billpay_kit::entity::Record;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Remittance {
///     pub id: String,
///     pub payer: String,
/// }
///
/// impl Record for Remittance {
///     type Key = String;
///
///     fn record_key(&self) -> Self::Key {
///         self.id.clone()
///     }
///
///     fn record_prefix() -> &'static str {
///         "remittance"
///     }
/// }
/// ```
pub trait Record: Send + Sync + Serialize + for<'de> Deserialize<'de> + Clone {
    /// Type of the record's key/ID (typically String or UUID)
    type Key: Display + Clone + Send + Sync + Eq + Hash + 'static;

    /// Return the record's unique key.
    fn record_key(&self) -> Self::Key;

    /// Namespace for this record type. Final store key format: `"{prefix}:{key}"`
    fn record_prefix() -> &'static str;

    /// Encode for storage using the versioned postcard envelope.
    ///
    /// ```text
    /// [MAGIC: 4 bytes] [VERSION: 4 bytes] [POSTCARD PAYLOAD]
    /// ```
    fn encode(&self) -> Result<Vec<u8>> {
        crate::serialization::encode_record(self)
    }

    /// Decode from storage, checking magic and schema version first.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord`: Bad magic or corrupted envelope
    /// - `Error::VersionMismatch`: Schema version changed
    /// - `Error::DeserializationError`: Corrupted payload
    fn decode(bytes: &[u8]) -> Result<Self> {
        crate::serialization::decode_record(bytes)
    }

    /// Optional: Validate record invariants after decoding.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

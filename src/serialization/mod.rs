//! Postcard-based record encoding with versioned envelopes.
//!
//! Every record written to a store backend follows this format:
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (4 bytes)│POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "BPAY"              u32                postcard::to_allocvec(T)
//! ```
//!
//! Decoding checks magic and version before touching the payload, so a record
//! written by an incompatible build is rejected instead of misread.
//!
//! # Example
//!
//! ```rust
//! use billpay_kit::serialization::{encode_record, decode_record};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Receipt {
//!     id: u64,
//!     payer: String,
//! }
//!
//! # fn main() -> billpay_kit::Result<()> {
//! let receipt = Receipt { id: 1, payer: "Mindanao Hardware".to_string() };
//! let bytes = encode_record(&receipt)?;
//! let decoded: Receipt = decode_record(&bytes)?;
//! assert_eq!(receipt, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for stored records: b"BPAY"
pub const RECORD_MAGIC: [u8; 4] = *b"BPAY";

/// Current schema version.
///
/// Increment when a stored type changes shape (fields added, removed,
/// reordered, enum variants changed). Records with another version fail to
/// decode with `Error::VersionMismatch`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around every stored record.
///
/// ```rust
/// use billpay_kit::serialization::RecordEnvelope;
///
/// let envelope = RecordEnvelope::new("data");
/// assert_eq!(envelope.magic, *b"BPAY");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordEnvelope<T> {
    /// Magic header: must be b"BPAY"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The record itself
    pub payload: T,
}

impl<T> RecordEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: RECORD_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value with envelope for storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = RecordEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Record serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a stored value, validating the envelope.
///
/// # Errors
///
/// - `Error::InvalidRecord`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
/// - `Error::DeserializationError`: Corrupted Postcard payload
pub fn decode_record<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: RecordEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        error!("Record deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != RECORD_MAGIC {
        warn!(
            "Invalid record: expected magic {:?}, got {:?}",
            RECORD_MAGIC, envelope.magic
        );
        return Err(Error::InvalidRecord(format!(
            "Invalid magic: expected {:?}, got {:?}",
            RECORD_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Record version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

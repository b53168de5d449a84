//! Error types for the billing core.

use crate::link::LinkStatus;
use chrono::{DateTime, Utc};
use std::fmt;

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the billing core.
///
/// Every fallible operation in the crate returns `Result<T>`. The variants map
/// onto the failure classes a caller has to handle differently:
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed configuration (fee schedule, link settings).
    ///
    /// Raised when a `FeeSchedule` or `PaymentsConfig` is built or loaded, never
    /// per calculation. Common causes:
    /// - Negative fee percentage or fixed amount
    /// - Duplicate payment method in a schedule
    /// - Token length below the minimum entropy
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),

    /// Invalid input supplied by the caller.
    ///
    /// Common causes:
    /// - Negative or non-finite invoice amount
    /// - Missing email/phone for the requested send channel
    /// - Blank cancellation reason
    /// - Payment method not offered on the link
    ///
    /// **Recovery:** None; surface to the user.
    ValidationError(String),

    /// Attempted transition on a link that already reached a terminal state.
    ///
    /// The stored record is left untouched; `status` is authoritative.
    TerminalState {
        /// Terminal status the link is in
        status: LinkStatus,
    },

    /// Attempted payment (or other transition) on a link past its expiry.
    ///
    /// The link has been moved to `expired` before this error is returned.
    Expired {
        /// When the link expired
        expires_at: DateTime<Utc>,
    },

    /// Record not found.
    NotFound(String),

    /// Optimistic concurrency conflict: the record changed underneath.
    ///
    /// Returned once the configured retry budget is exhausted.
    Conflict(String),

    /// The invoice already has an active payment link.
    ///
    /// Only returned under `ActiveLinkPolicy::Reject`.
    ActiveLinkExists {
        /// Invoice the link belongs to
        invoice_id: String,
        /// Token of the existing active link
        token: String,
    },

    /// Serialization failed when encoding a record for the store.
    SerializationError(String),

    /// Deserialization failed when decoding a stored record.
    ///
    /// **Recovery:** The stored bytes are corrupted; the record must be rebuilt.
    DeserializationError(String),

    /// Invalid stored record: corrupted envelope or bad magic.
    InvalidRecord(String),

    /// Schema version mismatch between code and stored data.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from stored record)
        found: u32,
    },

    /// Store backend error.
    BackendError(String),

    /// Operation not supported by this backend or repository.
    NotImplemented(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// True for errors the caller may retry after reloading the record.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::TerminalState { status } => {
                write!(f, "Payment link is finalized with status {}", status)
            }
            Error::Expired { expires_at } => {
                write!(f, "Payment link expired at {}", expires_at.to_rfc3339())
            }
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Conflict(msg) => write!(f, "Concurrent modification: {}", msg),
            Error::ActiveLinkExists { invoice_id, token } => write!(
                f,
                "Invoice {} already has an active payment link ({})",
                invoice_id, token
            ),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidRecord(msg) => write!(f, "Invalid stored record: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Record version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<rust_decimal::Error> for Error {
    fn from(e: rust_decimal::Error) -> Self {
        Error::ValidationError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

//! Store key construction.

use crate::entity::Record;

/// Builder for store keys.
pub struct RecordKeyBuilder;

impl RecordKeyBuilder {
    /// Build full store key from record type and ID.
    pub fn build<T: Record>(id: &T::Key) -> String {
        format!("{}:{}", T::record_prefix(), id)
    }

    /// Prefix that matches every key of record type `T`.
    pub fn prefix<T: Record>() -> String {
        format!("{}:", T::record_prefix())
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }
}

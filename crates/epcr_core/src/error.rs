//! Error types for record and packet operations.

use crate::packet::PacketKind;
use epcr_storage::StorageError;
use thiserror::Error;

/// Result type for record and packet operations.
pub type PacketResult<T> = Result<T, PacketError>;

/// Errors that can occur while loading or writing packets.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The store rejected a read or write.
    #[error("store error: {0}")]
    Storage(#[from] StorageError),

    /// A field value is not acceptable to the store schema.
    #[error("{kind} packet: invalid {field}: {message}")]
    Validation {
        /// Packet the field belongs to.
        kind: PacketKind,
        /// Field name.
        field: &'static str,
        /// What is wrong with the value.
        message: String,
    },

    /// No `records` row exists for the id.
    #[error("unknown record {0}")]
    UnknownRecord(i64),
}

impl PacketError {
    /// Creates a validation error.
    pub fn validation(kind: PacketKind, field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            field,
            message: message.into(),
        }
    }

    /// Returns true for validation-class errors, which are shown to the user
    /// instead of being logged.
    pub fn is_validation(&self) -> bool {
        matches!(self, PacketError::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_names_field() {
        let err = PacketError::validation(PacketKind::Medicine, "time", "expected HH:MM");
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "medicine packet: invalid time: expected HH:MM");
        assert!(!PacketError::UnknownRecord(3).is_validation());
    }
}

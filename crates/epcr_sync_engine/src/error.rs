//! Error types for the sync engine.

use epcr_core::PacketError;
use epcr_storage::StorageError;
use epcr_sync_protocol::FrameError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during connection and transfer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The store or the center could not be reached.
    #[error("connectivity error: {message}")]
    Connectivity {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed or unexpected acknowledgement traffic.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store rejected a read or write.
    #[error("data error: {0}")]
    Data(#[from] StorageError),

    /// A record could not be loaded or written.
    #[error("record error: {0}")]
    Record(#[source] PacketError),

    /// The same record was queued twice in one batch.
    #[error("record {0} appears more than once in the batch")]
    DuplicateRecord(i64),

    /// A field value was refused; the message is meant for the user.
    #[error("{0}")]
    Validation(String),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// No message arrived in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The connection is not open.
    #[error("not connected")]
    NotConnected,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A background task ended abnormally.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Creates a connectivity error.
    pub fn connectivity(message: impl Into<String>, retryable: bool) -> Self {
        Self::Connectivity {
            message: message.into(),
            retryable,
        }
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Connectivity { retryable, .. } => *retryable,
            SyncError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<PacketError> for SyncError {
    fn from(e: PacketError) -> Self {
        match e {
            PacketError::Storage(inner) => SyncError::Data(inner),
            e if e.is_validation() => SyncError::Validation(e.to_string()),
            e => SyncError::Record(e),
        }
    }
}

impl From<FrameError> for SyncError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(io) => SyncError::connectivity(io.to_string(), true),
            other => SyncError::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcr_audit::describe_error;
    use epcr_core::PacketKind;
    use std::error::Error as _;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::connectivity("refused", true).is_retryable());
        assert!(!SyncError::connectivity("gave up", false).is_retryable());
        assert!(SyncError::Timeout("ack".into()).is_retryable());
        assert!(!SyncError::Protocol("dup".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn packet_errors_split_by_class() {
        let validation = PacketError::validation(PacketKind::Action, "time", "expected HH:MM");
        assert!(matches!(SyncError::from(validation), SyncError::Validation(_)));
        let unknown = PacketError::UnknownRecord(9);
        assert!(matches!(SyncError::from(unknown), SyncError::Record(_)));
        let storage = PacketError::Storage(StorageError::Closed);
        assert!(matches!(SyncError::from(storage), SyncError::Data(_)));
    }

    #[test]
    fn store_failures_keep_their_cause() {
        let cause = StorageError::Rejected("constraint failed".into()).to_string();
        let err = SyncError::from(StorageError::Rejected("constraint failed".into()));
        assert_eq!(err.source().map(|s| s.to_string()), Some(cause.clone()));
        assert!(describe_error(&err).ends_with(&cause));

        let err = SyncError::from(PacketError::UnknownRecord(7));
        assert_eq!(err.source().map(|s| s.to_string()), Some("unknown record 7".into()));
    }

    #[test]
    fn frame_errors_split_by_class() {
        let io = FrameError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(SyncError::from(io).is_retryable());
        assert!(matches!(
            SyncError::from(FrameError::Truncated),
            SyncError::Protocol(_)
        ));
    }
}

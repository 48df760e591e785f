//! Error types for the audit log.

use std::io;
use thiserror::Error;

/// Result type for audit log operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that can occur in the log service.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink failed to write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `start` was called on a running or stopped service.
    #[error("log service already started")]
    AlreadyStarted,

    /// The flusher is not running.
    #[error("log service is not running")]
    NotRunning,

    /// The sink rejected a drained generation. The entries are kept and
    /// retried on the next pass.
    #[error("audit sink write failed: {0}")]
    SinkFailed(String),

    /// The flusher thread panicked.
    #[error("log flusher terminated abnormally")]
    FlusherPanicked,
}

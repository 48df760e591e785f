//! Error types for the center.

use epcr_sync_protocol::FrameError;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the center.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Cause.
        #[source]
        source: std::io::Error,
    },

    /// A frame could not be read or written.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The field unit sent nothing in time.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the field unit caused the error.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Frame(e) => e.is_malformed(),
            ServerError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(ServerError::Frame(FrameError::Truncated).is_client_error());
        assert!(ServerError::Timeout(Duration::from_secs(1)).is_client_error());
        assert!(!ServerError::Internal("x".into()).is_client_error());
    }
}

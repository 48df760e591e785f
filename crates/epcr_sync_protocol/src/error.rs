//! Framing errors.

use thiserror::Error;

/// Result type for framing operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors that can occur while encoding, decoding or moving frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A payload is not a valid message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A length prefix exceeds the frame limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge {
        /// Announced payload length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The stream ended inside a frame.
    #[error("stream closed mid-frame")]
    Truncated,
}

impl FrameError {
    /// Returns true if the peer sent bytes that are not a valid frame.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            FrameError::Decode(_) | FrameError::TooLarge { .. } | FrameError::Truncated
        )
    }
}

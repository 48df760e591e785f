//! Length-prefixed CBOR frames over an async byte stream.

use crate::error::{FrameError, FrameResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Encodes `msg` as a complete frame (length prefix plus payload).
///
/// # Errors
///
/// Returns an error if the message cannot be encoded or is too large.
pub fn encode_frame<T: Serialize>(msg: &T) -> FrameResult<Vec<u8>> {
    let mut frame = vec![0u8; PREFIX_LEN];
    ciborium::ser::into_writer(msg, &mut frame).map_err(|e| FrameError::Encode(e.to_string()))?;

    let len = frame.len() - PREFIX_LEN;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    // len <= MAX_FRAME_LEN, which fits in u32
    frame[..PREFIX_LEN].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(frame)
}

/// Decodes a frame payload (without its length prefix).
///
/// # Errors
///
/// Returns [`FrameError::Decode`] if the payload is not a valid `T`.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> FrameResult<T> {
    ciborium::de::from_reader(payload).map_err(|e| FrameError::Decode(e.to_string()))
}

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> FrameResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly between frames.
///
/// # Errors
///
/// Returns [`FrameError::Truncated`] if the stream ends inside a frame,
/// [`FrameError::TooLarge`] for an oversized length prefix, and
/// [`FrameError::Decode`] for a malformed payload.
pub async fn read_frame<R, T>(reader: &mut R) -> FrameResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(FrameError::Truncated)
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Truncated)
        }
        Err(e) => return Err(e.into()),
    }
    decode_payload(&payload).map(Some)
}

//! # EPCR Sync Protocol
//!
//! Wire messages exchanged between a field unit and the center.
//!
//! The field unit sends an ordered stream of [`PacketSet`]s, one per record.
//! The center answers every packet set with exactly one [`Acknowledgement`]
//! carrying the id it assigned, or [`SENTINEL_SERVER_ID`] when the record
//! was not stored.
//!
//! Each message travels as one frame: a 4-byte big-endian payload length
//! followed by the CBOR encoding of the message. Frames larger than
//! [`MAX_FRAME_LEN`] are rejected before any payload is read.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod framing;
mod messages;

pub use error::{FrameError, FrameResult};
pub use framing::{decode_payload, encode_frame, read_frame, write_frame, MAX_FRAME_LEN};
pub use messages::{Acknowledgement, PacketSet, ACK_OK, SENTINEL_SERVER_ID, TRANSFER_FAILED};

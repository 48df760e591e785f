//! # EPCR Sync Engine
//!
//! Moves completed patient care records from a field unit to the center.
//!
//! This crate provides:
//! - [`ConnectionManager`]: one store connection with bounded retry and
//!   optional bring-up of a local store process
//! - [`TransferCoordinator`]: sends every record of a [`TransferBatch`] as a
//!   packet set over a [`CenterTransport`]
//! - [`AckReceiver`]: drains acknowledgements concurrently with sending and
//!   correlates them to outstanding records
//! - [`CancelToken`]: interrupts connect retries and acknowledgement waits
//!
//! ## Transfer flow
//!
//! 1. Load the batch from the local store
//! 2. Open a stream to the center and split it
//! 3. Start the receiver on the read half, expecting one acknowledgement per
//!    record
//! 4. Write the packet sets in order on the write half, then shut it down
//! 5. Collect acknowledgements and reconcile server ids into the local store
//!
//! ## Key Invariants
//!
//! - Every record in a batch gets exactly one acknowledgement, real or
//!   synthetic, never two
//! - A record's server id is only stored after a positive acknowledgement
//! - The acknowledgement stream is released on every receiver exit path
//! - Only the initial connect sequence retries automatically

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod connection;
mod error;
mod receiver;
mod transfer;
mod transport;

pub use cancel::CancelToken;
pub use config::{RetryConfig, SyncConfig};
pub use connection::{
    BringUpCommand, ConnectionManager, ConnectionState, SqliteConnector, StoreConnector,
    StoreCredentials,
};
pub use error::{SyncError, SyncResult};
pub use receiver::{AckReceiver, ReceiverOutcome, ReceiverState};
pub use transfer::{TransferBatch, TransferCoordinator, TransferHandle, TransferReport};
pub use transport::{CenterTransport, MockTransport, TcpTransport};

//! # EPCR Sync Server
//!
//! The center's side of record transfer.
//!
//! Field units connect over TCP and send one [`PacketSet`] per record. For
//! each packet set the center, in one store transaction:
//!
//! 1. Inserts a `records` row; its generated key is the server id
//! 2. Writes every packet under the server id, enriching patients from the
//!    identity registry when one is configured
//! 3. Commits and answers `(local id, server id, "OK")`
//!
//! A packet with an invalid field rolls the record back and is answered with
//! a rejection carrying the validation message. Any other store failure is
//! written to the audit log and answered with a generic rejection. A
//! malformed frame closes the connection.
//!
//! [`PacketSet`]: epcr_sync_protocol::PacketSet

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{RecordWriter, STORE_FAILED};
pub use server::{serve_connection, CenterServer, ConnectionStats};

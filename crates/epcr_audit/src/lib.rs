//! # EPCR Audit
//!
//! Durable, append-only audit log for the field unit and the center.
//!
//! Producers call [`AuditLog::append`] (or one of the `record*` helpers),
//! which only pushes onto an in-memory buffer and returns. A flusher thread
//! owned by [`LogService`] swaps the active buffer for an empty spare and
//! writes the swapped-out generation to a [`LogSink`] without holding the
//! producer lock.
//!
//! ## Ordering
//!
//! Every accepted entry gets a sequence number under the buffer lock, so the
//! sequence order is the arrival order. Generations drain strictly in swap
//! order, so the sink sees sequence numbers in increasing order. A generation
//! the sink rejects is kept and written ahead of newer entries on the next
//! pass, and [`AuditLog::flush`] reports the failure.
//!
//! ## Lifecycle
//!
//! ```rust
//! use epcr_audit::{LogConfig, LogService, MemorySink};
//!
//! let sink = MemorySink::new();
//! let mut service = LogService::new(Box::new(sink.clone()), LogConfig::default());
//! let log = service.handle();
//! service.start().unwrap();
//!
//! log.record("transfer", "batch started");
//! service.stop().unwrap();
//!
//! assert_eq!(sink.entries().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod error;
mod service;
mod sink;

pub use entry::{describe_error, LogEntry};
pub use error::{AuditError, AuditResult};
pub use service::{AuditLog, LogConfig, LogService};
pub use sink::{FileSink, LogSink, MemorySink};

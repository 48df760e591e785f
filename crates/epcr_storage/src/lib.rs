//! # EPCR Storage
//!
//! Relational store abstraction for the EPCR field unit and the central
//! facility.
//!
//! The store itself is an external relational database. This crate does not
//! define a persistence format; it only gives the rest of the workspace a
//! narrow, parameterized interface to one:
//!
//! - [`Store`] - `query`, `update` and the generated-key `insert` variant
//! - [`Statement`] - SQL text plus bound [`Value`] parameters (never
//!   concatenated free text)
//! - [`SharedStore`] - a single physical connection whose operations are
//!   serialized behind a mutex
//!
//! ## Available Backends
//!
//! - [`SqliteStore`] - file-backed or in-memory SQLite connection
//!
//! ## Example
//!
//! ```rust
//! use epcr_storage::{SqliteStore, Statement, Store};
//!
//! let mut store = SqliteStore::open_in_memory().unwrap();
//! store.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//! let id = store
//!     .insert(&Statement::new("INSERT INTO t (name) VALUES (?1)").bind("O'Brien"))
//!     .unwrap();
//! let rows = store
//!     .query(&Statement::new("SELECT name FROM t WHERE id = ?1").bind(id))
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod shared;
mod sqlite;
mod store;
mod value;

pub use error::{StorageError, StorageResult};
pub use shared::SharedStore;
pub use sqlite::SqliteStore;
pub use store::{with_transaction, Store};
pub use value::{Row, RowSet, Statement, Value};

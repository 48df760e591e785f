//! # EPCR Testkit
//!
//! Test utilities for EPCR.
//!
//! This crate provides:
//! - Store fixtures: in-memory and temporary-file stores with the schema
//!   installed, and seeded records
//! - Property-based generators for every packet variant
//! - Store connectors with scripted failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use epcr_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let mut store = memory_store();
//!     let ids = seed_scenario(&mut store);
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod connectors;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::connectors::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use connectors::*;
pub use fixtures::*;
pub use generators::*;

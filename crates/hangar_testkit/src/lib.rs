//! # Hangar Testkit
//!
//! Test utilities for the Hangar sync crates.
//!
//! This crate provides:
//! - Seeded legacy datasets and record payloads
//! - Temporary file-backed stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hangar_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_legacy_data() {
//!     let store = memory_store();
//!     LegacyDataset::standard().seed(store.as_ref()).unwrap();
//!     // ... run a migration
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

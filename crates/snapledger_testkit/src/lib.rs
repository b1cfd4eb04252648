//! # snapledger testkit
//!
//! Test utilities for snapledger.
//!
//! This crate provides:
//! - Engines over memory and temporary file stores driven by a manual clock
//! - Property-based test generators using proptest
//! - Helpers that run whole collection passes and check ledger consistency
//!
//! ## Usage
//!
//! ```rust
//! use snapledger_testkit::prelude::*;
//!
//! with_memory_engine(|engine| {
//!     let kind = instance_kind();
//!     run_pass(engine, &kind, ts(1), vec![instance("vm-1", ts(1), "RUNNING")]);
//!     assert_ledger_ok(engine, &kind);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;

//! # snapledger storage
//!
//! Record model and transactional store contract for snapledger.
//!
//! This crate provides the lowest layer of the engine: the shapes every
//! resource type reduces to, and the stores that keep them. Stores know
//! nothing about diffing or history semantics; they expose point lookups,
//! range scans and row writes inside an all-or-nothing transaction.
//!
//! ## Tables
//!
//! Every store keeps, per [`ResourceKind`]:
//! - a **current** table, one [`CurrentRecord`] per live `resource_id`
//! - an append-only **history** table of [`HistoryRecord`] intervals
//! - a **high watermark**, the newest batch timestamp applied
//!
//! ## Available stores
//!
//! - [`MemoryStore`] - For testing and ephemeral state
//! - [`FileStore`] - Memory store persisted to a locked directory on every commit
//!
//! ## Example
//!
//! ```rust
//! use snapledger_storage::{MemoryStore, ResourceKind, SnapshotStore, StoreTransaction};
//!
//! let store = MemoryStore::new();
//! let kind = ResourceKind::new("compute.instance");
//!
//! let mut txn = store.begin().unwrap();
//! assert!(txn.get_current(&kind, "vm-1").unwrap().is_none());
//! store.abort(txn).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod partition;
mod record;
mod store;
mod value;

pub use error::{StorageError, StorageResult};
pub use file::{FileStore, StoreConfig};
pub use memory::{MemoryStore, MemoryTransaction};
pub use record::{CanonicalSnapshot, Children, CurrentRecord, HistoryRecord, ResourceKind, Timestamp};
pub use store::{SnapshotStore, StoreTransaction};
pub use value::{ChildRecord, FieldValue, Fields};

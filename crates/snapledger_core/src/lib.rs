//! # snapledger core
//!
//! Bitemporal snapshot synchronization.
//!
//! A collection run hands the engine every snapshot it fetched for one
//! resource kind. The engine converges the current table to that batch and
//! keeps an interval-versioned history of every state each resource has
//! had:
//!
//! - **Differ** ([`diff()`]) - classifies a snapshot as new, changed or unchanged
//! - **History ledger** ([`ledger`]) - opens and closes validity intervals
//! - **Synchronizer** ([`SyncEngine::sync`]) - applies a batch in one transaction
//! - **Staleness reconciler** ([`SyncEngine::reconcile_stale`]) - retires
//!   resources the source stopped reporting
//!
//! Resource kinds are described by a [`ResourceSchema`], so one engine
//! serves every kind.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use snapledger_core::{ResourceSchema, SyncBatch, SyncEngine};
//! use snapledger_storage::{CanonicalSnapshot, MemoryStore, ResourceKind};
//!
//! let engine = SyncEngine::new(MemoryStore::new());
//! engine.register(ResourceSchema::new("iam.policy")).unwrap();
//! let kind = ResourceKind::new("iam.policy");
//!
//! let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
//! let t2 = t1 + Duration::hours(1);
//! engine
//!     .sync(&kind, &SyncBatch::new(t1).with_snapshot(CanonicalSnapshot::new("p-1", t1)))
//!     .unwrap();
//!
//! // The next run no longer reports p-1.
//! engine.sync(&kind, &SyncBatch::new(t2)).unwrap();
//! let report = engine.reconcile_stale(&kind, t2).unwrap();
//! assert_eq!(report.retired, vec!["p-1".to_string()]);
//! assert_eq!(engine.history(&kind, "p-1").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod diff;
mod engine;
mod error;
pub mod ledger;
mod query;
mod reconcile;
mod schema;
mod stats;
mod sync;
mod transaction;
mod verify;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, ValidTime};
pub use diff::{diff, Diff};
pub use engine::SyncEngine;
pub use error::{CoreError, CoreResult};
pub use reconcile::ReconcileReport;
pub use schema::{ChildSpec, FieldEquality, FieldSpec, ResourceSchema};
pub use stats::{EngineStats, StatsSnapshot};
pub use sync::{SyncBatch, SyncReport};
pub use transaction::run_in_transaction;
pub use verify::{LedgerIssue, VerifyReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! The synchronization engine.

use parking_lot::RwLock;
use snapledger_storage::{
    CurrentRecord, HistoryRecord, ResourceKind, SnapshotStore, StoreTransaction, Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, ValidTime};
use crate::error::{CoreError, CoreResult};
use crate::query;
use crate::reconcile::{check_watermark, retire_stale, ReconcileReport};
use crate::schema::ResourceSchema;
use crate::stats::EngineStats;
use crate::sync::{apply_batch, validate_batch, SyncBatch, SyncReport};
use crate::transaction::run_in_transaction;
use crate::verify::{verify_kind, VerifyReport};

/// One engine instance serves every resource kind registered with it.
///
/// `sync` and `reconcile_stale` each run in their own store transaction.
/// Callers must not run two batches of the same kind concurrently; doing so
/// makes one of the commits fail with a storage conflict.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use snapledger_core::{FieldSpec, ResourceSchema, SyncBatch, SyncEngine};
/// use snapledger_storage::{CanonicalSnapshot, MemoryStore, ResourceKind};
///
/// let engine = SyncEngine::new(MemoryStore::new());
/// engine
///     .register(ResourceSchema::new("compute.instance").with_field(FieldSpec::new("status")))
///     .unwrap();
///
/// let kind = ResourceKind::new("compute.instance");
/// let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let batch = SyncBatch::new(t1)
///     .with_snapshot(CanonicalSnapshot::new("vm-1", t1).with_field("status", "RUNNING"));
///
/// let report = engine.sync(&kind, &batch).unwrap();
/// assert_eq!(report.created, 1);
/// assert_eq!(engine.history(&kind, "vm-1").unwrap().len(), 1);
/// ```
pub struct SyncEngine<S: SnapshotStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    config: EngineConfig,
    schemas: RwLock<HashMap<ResourceKind, Arc<ResourceSchema>>>,
    stats: EngineStats,
}

impl<S: SnapshotStore> SyncEngine<S, SystemClock> {
    /// Creates an engine with the default configuration and the system clock.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Creates an engine with the system clock.
    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: SnapshotStore, C: Clock> SyncEngine<S, C> {
    /// Creates an engine with an explicit clock.
    pub fn with_clock(store: S, clock: C, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
            schemas: RwLock::new(HashMap::new()),
            stats: EngineStats::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Returns the engine statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    // ── Schemas ──────────────────────────────────────────────────────────

    /// Registers the schema of a kind, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the schema is malformed.
    pub fn register(&self, schema: ResourceSchema) -> CoreResult<()> {
        schema.validate()?;
        tracing::debug!(kind = %schema.kind, "schema registered");
        self.schemas
            .write()
            .insert(schema.kind.clone(), Arc::new(schema));
        Ok(())
    }

    /// Returns the schema registered for a kind.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResourceKind` if none is registered.
    pub fn schema(&self, kind: &ResourceKind) -> CoreResult<Arc<ResourceSchema>> {
        self.schemas
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| CoreError::UnknownResourceKind { kind: kind.clone() })
    }

    /// Returns every registered kind, sorted.
    pub fn registered_kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self.schemas.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// Applies one collection run of `kind` as a single transaction.
    ///
    /// Either every snapshot is applied and the kind's high watermark
    /// advances, or nothing changes.
    ///
    /// # Errors
    ///
    /// Input errors (see [`CoreError::is_input_error`]) are raised before
    /// anything is written. Storage errors and history invariant violations
    /// roll the whole batch back.
    pub fn sync(&self, kind: &ResourceKind, batch: &SyncBatch) -> CoreResult<SyncReport> {
        let span = tracing::info_span!(
            "sync",
            %kind,
            collected_at = %batch.collected_at,
            snapshots = batch.len()
        );
        let _enter = span.enter();
        let started = Instant::now();

        let result = self.schema(kind).and_then(|schema| {
            validate_batch(&schema, &self.config, batch)?;
            let valid_at = match self.config.valid_time {
                ValidTime::Collection => batch.collected_at,
                ValidTime::Processing => self.clock.now(),
            };
            run_in_transaction(&self.store, |txn| {
                apply_batch(txn, &schema, &self.config, batch, valid_at)
            })
        });

        match result {
            Ok(counts) => {
                self.stats
                    .record_batch(counts.created, counts.updated, counts.unchanged);
                let report = SyncReport {
                    kind: kind.clone(),
                    collected_at: batch.collected_at,
                    created: counts.created,
                    updated: counts.updated,
                    unchanged: counts.unchanged,
                    duration: started.elapsed(),
                };
                tracing::info!(
                    created = report.created,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    elapsed_ms = report.duration.as_millis() as u64,
                    "batch applied"
                );
                Ok(report)
            }
            Err(e) => {
                self.stats.record_batch_failure();
                tracing::warn!(error = %e, retryable = e.is_retryable(), "batch rejected");
                Err(e)
            }
        }
    }

    /// Retires every record of `kind` not observed at or after `watermark`.
    ///
    /// Runs in its own transaction; a failure leaves the preceding sync
    /// intact and can be retried. Running it twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns `WatermarkAhead` if out-of-order rejection is on and no sync
    /// of the kind has reached `watermark`.
    pub fn reconcile_stale(
        &self,
        kind: &ResourceKind,
        watermark: Timestamp,
    ) -> CoreResult<ReconcileReport> {
        let span = tracing::info_span!("reconcile", %kind, %watermark);
        let _enter = span.enter();
        let started = Instant::now();

        let result = run_in_transaction(&self.store, |txn| {
            check_watermark(txn, kind, &self.config, watermark)?;
            retire_stale(txn, kind, watermark, self.clock.now())
        });

        match result {
            Ok(retired) => {
                self.stats.record_reconciliation(retired.len());
                let report = ReconcileReport {
                    kind: kind.clone(),
                    watermark,
                    retired,
                    duration: started.elapsed(),
                };
                tracing::info!(retired = report.retired.len(), "reconciliation applied");
                Ok(report)
            }
            Err(e) => {
                self.stats.record_reconciliation_failure();
                tracing::warn!(error = %e, retryable = e.is_retryable(), "reconciliation rejected");
                Err(e)
            }
        }
    }

    /// Returns the ids `reconcile_stale` would retire, without writing.
    pub fn stale_candidates(
        &self,
        kind: &ResourceKind,
        watermark: Timestamp,
    ) -> CoreResult<Vec<String>> {
        self.read(|txn| Ok(txn.stale_current(kind, watermark)?))
    }

    /// Runs `f` in a store transaction: commit on `Ok`, abort on `Err`.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut S::Transaction) -> CoreResult<T>,
    {
        run_in_transaction(&self.store, f)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Returns the current record of a resource.
    pub fn current(&self, kind: &ResourceKind, resource_id: &str) -> CoreResult<Option<CurrentRecord>> {
        self.read(|txn| Ok(txn.get_current(kind, resource_id)?))
    }

    /// Returns every current record of a kind, in id order.
    pub fn list_current(&self, kind: &ResourceKind) -> CoreResult<Vec<CurrentRecord>> {
        self.read(|txn| Ok(txn.list_current(kind)?))
    }

    /// Returns every interval of a resource, ordered by `valid_from`.
    pub fn history(&self, kind: &ResourceKind, resource_id: &str) -> CoreResult<Vec<HistoryRecord>> {
        self.read(|txn| Ok(txn.history_for(kind, resource_id)?))
    }

    /// Returns the interval of a resource that contains `at`.
    pub fn history_as_of(
        &self,
        kind: &ResourceKind,
        resource_id: &str,
        at: Timestamp,
    ) -> CoreResult<Option<HistoryRecord>> {
        self.read(|txn| Ok(query::history_as_of(txn, kind, resource_id, at)?))
    }

    /// Returns the state of every resource of a kind at `at`, in id order.
    pub fn snapshot_as_of(&self, kind: &ResourceKind, at: Timestamp) -> CoreResult<Vec<HistoryRecord>> {
        self.read(|txn| Ok(query::snapshot_as_of(txn, kind, at)?))
    }

    /// Returns the newest batch timestamp applied to a kind.
    pub fn high_watermark(&self, kind: &ResourceKind) -> CoreResult<Option<Timestamp>> {
        self.read(|txn| Ok(txn.high_watermark(kind)?))
    }

    /// Returns every kind the store holds rows for.
    pub fn kinds(&self) -> CoreResult<Vec<ResourceKind>> {
        self.read(|txn| Ok(txn.kinds()?))
    }

    /// Cross-checks the current and history tables of a kind.
    pub fn verify(&self, kind: &ResourceKind) -> CoreResult<VerifyReport> {
        let report = self.read(|txn| Ok(verify_kind(txn, kind)?))?;
        for issue in &report.issues {
            tracing::error!(%kind, %issue, "ledger inconsistency");
        }
        Ok(report)
    }

    fn read<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut S::Transaction) -> CoreResult<T>,
    {
        let mut txn = self.store.begin()?;
        let result = f(&mut txn);
        let aborted = self.store.abort(txn);
        let value = result?;
        aborted?;
        Ok(value)
    }
}

impl<S: SnapshotStore, C: Clock> std::fmt::Debug for SyncEngine<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("kinds", &self.registered_kinds())
            .finish_non_exhaustive()
    }
}

//! Test fixtures and engine helpers.
//!
//! Provides engines over temporary stores with a manual clock, plus a
//! sample resource schema used throughout the tests.

use chrono::{TimeZone, Utc};
use snapledger_core::{
    ChildSpec, EngineConfig, FieldEquality, FieldSpec, ManualClock, ResourceSchema, SyncEngine,
};
use snapledger_storage::{
    CanonicalSnapshot, ChildRecord, FieldValue, FileStore, MemoryStore, ResourceKind,
    SnapshotStore, StoreConfig, Timestamp,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Kind used by [`instance_schema`].
pub const INSTANCE_KIND: &str = "compute.instance";

/// Base of every timestamp produced by [`ts`].
pub const EPOCH_SECS: i64 = 1_700_000_000;

/// Returns a timestamp `secs` seconds after a fixed epoch.
pub fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(EPOCH_SECS + secs, 0)
        .single()
        .expect("timestamp in range")
}

/// The kind of [`instance_schema`].
pub fn instance_kind() -> ResourceKind {
    ResourceKind::new(INSTANCE_KIND)
}

/// A compute instance: required `status`, volatile `etag`, and `labels`
/// keyed by `key`.
pub fn instance_schema() -> ResourceSchema {
    ResourceSchema::new(INSTANCE_KIND)
        .with_field(FieldSpec::new("status").required())
        .with_field(FieldSpec::new("etag").equality(FieldEquality::Ignore))
        .with_children(ChildSpec::new("labels", ["key"]))
}

/// Builds an instance snapshot.
pub fn instance(id: &str, at: Timestamp, status: &str) -> CanonicalSnapshot {
    CanonicalSnapshot::new(id, at).with_field("status", status)
}

/// Builds one `labels` child.
pub fn label(key: &str, value: &str) -> ChildRecord {
    ChildRecord::from([
        ("key".to_string(), FieldValue::from(key)),
        ("value".to_string(), FieldValue::from(value)),
    ])
}

/// An engine with a manual clock, with [`instance_schema`] registered.
pub struct TestEngine<S: SnapshotStore> {
    /// The engine instance.
    pub engine: SyncEngine<S, Arc<ManualClock>>,
    /// The engine's clock.
    pub clock: Arc<ManualClock>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEngine<MemoryStore> {
    /// Creates an engine over a memory store.
    pub fn memory() -> Self {
        Self::memory_with(EngineConfig::default())
    }

    /// Creates an engine over a memory store with a configuration.
    pub fn memory_with(config: EngineConfig) -> Self {
        Self::build(MemoryStore::new(), fresh_clock(), config, None)
    }
}

impl TestEngine<FileStore> {
    /// Creates an engine over a file store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path(), StoreConfig::default().sync_on_commit(false))
            .expect("Failed to open file store");
        Self::build(store, fresh_clock(), EngineConfig::default(), Some(temp_dir))
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.engine.store().path()
    }

    /// Closes the store and opens it again from disk, keeping the clock.
    pub fn reopen(self) -> Self {
        let Self {
            engine,
            clock,
            _temp_dir: temp_dir,
        } = self;
        let config = engine.config().clone();
        let path = engine.store().path().to_path_buf();
        drop(engine);

        let store = FileStore::open(&path, StoreConfig::default().sync_on_commit(false))
            .expect("Failed to reopen file store");
        Self::build(store, clock, config, temp_dir)
    }
}

impl<S: SnapshotStore> TestEngine<S> {
    fn build(
        store: S,
        clock: Arc<ManualClock>,
        config: EngineConfig,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let engine = SyncEngine::with_clock(store, Arc::clone(&clock), config);
        engine
            .register(instance_schema())
            .expect("Failed to register schema");
        Self {
            engine,
            clock,
            _temp_dir: temp_dir,
        }
    }
}

fn fresh_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(ts(0)))
}

impl<S: SnapshotStore> std::ops::Deref for TestEngine<S> {
    type Target = SyncEngine<S, Arc<ManualClock>>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with an engine over a memory store.
///
/// ```rust
/// use snapledger_testkit::{instance_kind, with_memory_engine};
///
/// with_memory_engine(|engine| {
///     assert!(engine.list_current(&instance_kind()).unwrap().is_empty());
/// });
/// ```
pub fn with_memory_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine<MemoryStore>) -> R,
{
    let engine = TestEngine::memory();
    f(&engine)
}

/// Runs a test with an engine over a temporary file store.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine<FileStore>) -> R,
{
    let engine = TestEngine::file();
    f(&engine)
}

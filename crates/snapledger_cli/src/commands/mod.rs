//! CLI command implementations.

pub mod history;
pub mod inspect;
pub mod stale;
pub mod verify;

use chrono::SecondsFormat;
use snapledger_core::SyncEngine;
use snapledger_storage::{FileStore, ResourceKind, StoreConfig, Timestamp};
use std::path::Path;

/// Opens an existing store read-side. A missing directory is an error, not
/// an empty store.
pub(crate) fn open_engine(path: &Path) -> Result<SyncEngine<FileStore>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let store = FileStore::open(path, StoreConfig::new().create_if_missing(false))?;
    Ok(SyncEngine::new(store))
}

/// The requested kind, or every kind the store holds.
pub(crate) fn selected_kinds(
    engine: &SyncEngine<FileStore>,
    kind: Option<&str>,
) -> Result<Vec<ResourceKind>, Box<dyn std::error::Error>> {
    match kind {
        Some(kind) => Ok(vec![ResourceKind::new(kind)]),
        None => Ok(engine.kinds()?),
    }
}

pub(crate) fn format_ts(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};
    use snapledger_core::{ResourceSchema, SyncBatch, SyncEngine};
    use snapledger_storage::{CanonicalSnapshot, FileStore, ResourceKind, StoreConfig, Timestamp};
    use tempfile::TempDir;

    pub fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// A store where `vm-1` changed once and `vm-2` was last seen at `ts(0)`.
    pub fn seeded_store() -> TempDir {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), StoreConfig::new().sync_on_commit(false)).unwrap();
        let engine = SyncEngine::new(store);
        engine.register(ResourceSchema::new("compute.instance")).unwrap();
        let kind = ResourceKind::new("compute.instance");

        let batch = SyncBatch::new(ts(0))
            .with_snapshot(CanonicalSnapshot::new("vm-1", ts(0)).with_field("status", "RUNNING"))
            .with_snapshot(CanonicalSnapshot::new("vm-2", ts(0)).with_field("status", "RUNNING"));
        engine.sync(&kind, &batch).unwrap();
        let batch = SyncBatch::new(ts(60))
            .with_snapshot(CanonicalSnapshot::new("vm-1", ts(60)).with_field("status", "STOPPED"));
        engine.sync(&kind, &batch).unwrap();
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{seeded_store, ts};

    #[test]
    fn open_engine_rejects_missing_store() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(open_engine(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn selected_kinds_defaults_to_every_kind() {
        let dir = seeded_store();
        let engine = open_engine(dir.path()).unwrap();
        assert_eq!(
            selected_kinds(&engine, None).unwrap(),
            vec![ResourceKind::new("compute.instance")]
        );
        assert_eq!(
            selected_kinds(&engine, Some("iam.policy")).unwrap(),
            vec![ResourceKind::new("iam.policy")]
        );
    }

    #[test]
    fn timestamps_print_as_rfc3339() {
        assert_eq!(format_ts(ts(0)), "2023-11-14T22:13:20Z");
    }
}

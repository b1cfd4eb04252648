//! File-backed store.
//!
//! Layout of a store directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ ledger.cbor       # Last committed state
//! └─ ledger.cbor.tmp   # Written on commit, then renamed over ledger.cbor
//! ```

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};
use crate::memory::{MemoryStore, MemoryTransaction, Partitions};
use crate::partition::{Partition, PersistedPartition};
use crate::store::SnapshotStore;

const LOCK_FILE: &str = "LOCK";
const STATE_FILE: &str = "ledger.cbor";
const STATE_TEMP: &str = "ledger.cbor.tmp";
const FORMAT_VERSION: u16 = 1;

/// Configuration for opening a [`FileStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the state file on every commit (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    format_version: u16,
    partitions: Vec<PersistedPartition>,
}

/// A store persisted to a directory.
///
/// Reads and transactions behave exactly like [`MemoryStore`]. On every
/// commit the complete would-be state is written to a temporary file and
/// renamed over the state file; only then does it become visible. A failed
/// write leaves both the file and the in-memory state as they were.
///
/// The directory is held with an exclusive advisory lock for the lifetime
/// of the store, so only one process can write to it at a time.
///
/// # Example
///
/// ```no_run
/// use snapledger_storage::{FileStore, StoreConfig};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("inventory"), StoreConfig::default()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    inner: MemoryStore,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - The state file cannot be decoded
    pub fn open(path: &Path, config: StoreConfig) -> StorageResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::corrupted(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::corrupted(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let partitions = load_state(&path.join(STATE_FILE))?;
        tracing::debug!(path = %path.display(), kinds = partitions.len(), "store opened");

        Ok(Self {
            path: path.to_path_buf(),
            config,
            inner: MemoryStore::with_partitions(partitions),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_state(&self, partitions: &Partitions) -> StorageResult<()> {
        let state = StateFile {
            format_version: FORMAT_VERSION,
            partitions: partitions
                .iter()
                .map(|(kind, partition)| partition.to_persisted(kind))
                .collect(),
        };

        let temp_path = self.path.join(STATE_TEMP);
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        ciborium::into_writer(&state, &mut writer).map_err(StorageError::codec)?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        if self.config.sync_on_commit {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, self.path.join(STATE_FILE))?;
        Ok(())
    }
}

fn load_state(path: &Path) -> StorageResult<Partitions> {
    if !path.exists() {
        return Ok(Partitions::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let state: StateFile = ciborium::from_reader(reader).map_err(StorageError::codec)?;
    if state.format_version != FORMAT_VERSION {
        return Err(StorageError::corrupted(format!(
            "unsupported state format version {}",
            state.format_version
        )));
    }

    let mut partitions = Partitions::new();
    for persisted in state.partitions {
        let kind = persisted.kind.clone();
        let partition = Partition::from_persisted(persisted)?;
        partitions.insert(kind, Arc::new(partition));
    }
    Ok(partitions)
}

impl SnapshotStore for FileStore {
    type Transaction = MemoryTransaction;

    fn begin(&self) -> StorageResult<MemoryTransaction> {
        self.inner.begin()
    }

    fn commit(&self, txn: MemoryTransaction) -> StorageResult<()> {
        self.inner
            .commit_with(txn, |partitions| self.write_state(partitions))
    }

    fn abort(&self, txn: MemoryTransaction) -> StorageResult<()> {
        self.inner.abort(txn)
    }
}

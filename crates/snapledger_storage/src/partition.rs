//! Per-kind table storage shared by the memory and file stores.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::record::{CurrentRecord, HistoryRecord, ResourceKind, Timestamp};

/// Tables of one resource kind.
///
/// History rows are append-only; `by_resource`, `open` and `open_ids` index
/// into `history` and are rebuilt on load rather than persisted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Partition {
    pub(crate) current: BTreeMap<String, CurrentRecord>,
    pub(crate) history: Vec<HistoryRecord>,
    by_resource: BTreeMap<String, Vec<usize>>,
    open: BTreeMap<String, usize>,
    open_ids: HashMap<Uuid, usize>,
    pub(crate) high_watermark: Option<Timestamp>,
    /// Bumped on every commit that replaces this partition.
    pub(crate) version: u64,
}

/// On-disk shape of a partition.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedPartition {
    pub(crate) kind: ResourceKind,
    pub(crate) version: u64,
    pub(crate) high_watermark: Option<Timestamp>,
    pub(crate) current: Vec<CurrentRecord>,
    pub(crate) history: Vec<HistoryRecord>,
}

impl Partition {
    pub(crate) fn get_current(&self, resource_id: &str) -> Option<&CurrentRecord> {
        self.current.get(resource_id)
    }

    pub(crate) fn insert_current(
        &mut self,
        kind: &ResourceKind,
        record: CurrentRecord,
    ) -> StorageResult<()> {
        if self.current.contains_key(&record.resource_id) {
            return Err(StorageError::DuplicateKey {
                table: "current",
                kind: kind.clone(),
                resource_id: record.resource_id,
            });
        }
        self.current.insert(record.resource_id.clone(), record);
        Ok(())
    }

    pub(crate) fn replace_current(
        &mut self,
        kind: &ResourceKind,
        record: CurrentRecord,
    ) -> StorageResult<()> {
        match self.current.get_mut(&record.resource_id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(StorageError::MissingRow {
                table: "current",
                kind: kind.clone(),
                key: record.resource_id,
            }),
        }
    }

    pub(crate) fn touch_current(&mut self, resource_ids: &[String], collected_at: Timestamp) -> usize {
        let mut touched = 0;
        for id in resource_ids {
            if let Some(record) = self.current.get_mut(id) {
                record.collected_at = collected_at;
                touched += 1;
            }
        }
        touched
    }

    pub(crate) fn delete_current(&mut self, resource_id: &str) -> bool {
        self.current.remove(resource_id).is_some()
    }

    pub(crate) fn stale_current(&self, watermark: Timestamp) -> Vec<String> {
        self.current
            .values()
            .filter(|record| record.collected_at < watermark)
            .map(|record| record.resource_id.clone())
            .collect()
    }

    pub(crate) fn insert_history(
        &mut self,
        kind: &ResourceKind,
        record: HistoryRecord,
    ) -> StorageResult<()> {
        if record.is_open() && self.open.contains_key(&record.resource_id) {
            return Err(StorageError::DuplicateKey {
                table: "history",
                kind: kind.clone(),
                resource_id: record.resource_id,
            });
        }
        let index = self.history.len();
        if record.is_open() {
            self.open.insert(record.resource_id.clone(), index);
            self.open_ids.insert(record.history_id, index);
        }
        self.by_resource
            .entry(record.resource_id.clone())
            .or_default()
            .push(index);
        self.history.push(record);
        Ok(())
    }

    pub(crate) fn open_history(&self, resource_id: &str) -> Option<&HistoryRecord> {
        self.open.get(resource_id).map(|&index| &self.history[index])
    }

    pub(crate) fn close_history(
        &mut self,
        kind: &ResourceKind,
        history_id: Uuid,
        valid_to: Timestamp,
    ) -> StorageResult<()> {
        let Some(index) = self.open_ids.remove(&history_id) else {
            return Err(StorageError::MissingRow {
                table: "history",
                kind: kind.clone(),
                key: history_id.to_string(),
            });
        };

        let row = &mut self.history[index];
        row.valid_to = Some(valid_to);
        self.open.remove(&row.resource_id);
        Ok(())
    }

    pub(crate) fn history_for(&self, resource_id: &str) -> Vec<HistoryRecord> {
        let mut rows: Vec<HistoryRecord> = self
            .by_resource
            .get(resource_id)
            .map(|indices| indices.iter().map(|&i| self.history[i].clone()).collect())
            .unwrap_or_default();
        rows.sort_by_key(|row| row.valid_from);
        rows
    }

    pub(crate) fn all_history(&self) -> Vec<HistoryRecord> {
        self.by_resource
            .keys()
            .flat_map(|resource_id| self.history_for(resource_id))
            .collect()
    }

    pub(crate) fn to_persisted(&self, kind: &ResourceKind) -> PersistedPartition {
        PersistedPartition {
            kind: kind.clone(),
            version: self.version,
            high_watermark: self.high_watermark,
            current: self.current.values().cloned().collect(),
            history: self.history.clone(),
        }
    }

    /// Rebuilds a partition and its indexes from its persisted form.
    pub(crate) fn from_persisted(persisted: PersistedPartition) -> StorageResult<Self> {
        let PersistedPartition {
            kind,
            version,
            high_watermark,
            current,
            history,
        } = persisted;

        let mut partition = Partition {
            high_watermark,
            version,
            ..Partition::default()
        };
        for record in current {
            partition
                .insert_current(&kind, record)
                .map_err(|e| StorageError::corrupted(e.to_string()))?;
        }
        for record in history {
            partition
                .insert_history(&kind, record)
                .map_err(|e| StorageError::corrupted(e.to_string()))?;
        }
        Ok(partition)
    }
}

//! Ledger verification.
//!
//! Cross-checks the current and history tables of one kind. A lineage is
//! every interval sharing a `resource_id` and a `first_collected_at`; within
//! a lineage intervals must be contiguous, and only the last may be open.

use snapledger_storage::{HistoryRecord, ResourceKind, StorageResult, StoreTransaction, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// One inconsistency found while verifying a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerIssue {
    /// More than one interval is open.
    MultipleOpenIntervals {
        /// Resource id.
        resource_id: String,
        /// Number of open intervals.
        count: usize,
    },
    /// An interval starts before the previous one in its lineage ends.
    Overlap {
        /// Resource id.
        resource_id: String,
        /// Earlier interval.
        first: Uuid,
        /// Later interval.
        second: Uuid,
    },
    /// An interval starts after the previous one in its lineage ends.
    Gap {
        /// Resource id.
        resource_id: String,
        /// Earlier interval.
        first: Uuid,
        /// Later interval.
        second: Uuid,
    },
    /// A current record has no open interval.
    CurrentWithoutOpenInterval {
        /// Resource id.
        resource_id: String,
    },
    /// An open interval has no current record.
    OpenIntervalWithoutCurrent {
        /// Resource id.
        resource_id: String,
    },
    /// The current record and its open interval disagree on provenance.
    ProvenanceMismatch {
        /// Resource id.
        resource_id: String,
        /// `first_collected_at` of the current record.
        current: Timestamp,
        /// `first_collected_at` of the open interval.
        history: Timestamp,
    },
    /// An interval ends before it starts.
    NegativeInterval {
        /// Resource id.
        resource_id: String,
        /// Offending interval.
        history_id: Uuid,
    },
}

impl LedgerIssue {
    /// Resource id the issue is about.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        match self {
            LedgerIssue::MultipleOpenIntervals { resource_id, .. }
            | LedgerIssue::Overlap { resource_id, .. }
            | LedgerIssue::Gap { resource_id, .. }
            | LedgerIssue::CurrentWithoutOpenInterval { resource_id }
            | LedgerIssue::OpenIntervalWithoutCurrent { resource_id }
            | LedgerIssue::ProvenanceMismatch { resource_id, .. }
            | LedgerIssue::NegativeInterval { resource_id, .. } => resource_id,
        }
    }
}

impl fmt::Display for LedgerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerIssue::MultipleOpenIntervals { resource_id, count } => {
                write!(f, "{resource_id}: {count} open intervals")
            }
            LedgerIssue::Overlap {
                resource_id,
                first,
                second,
            } => write!(f, "{resource_id}: interval {second} overlaps {first}"),
            LedgerIssue::Gap {
                resource_id,
                first,
                second,
            } => write!(f, "{resource_id}: gap between {first} and {second}"),
            LedgerIssue::CurrentWithoutOpenInterval { resource_id } => {
                write!(f, "{resource_id}: current record has no open interval")
            }
            LedgerIssue::OpenIntervalWithoutCurrent { resource_id } => {
                write!(f, "{resource_id}: open interval has no current record")
            }
            LedgerIssue::ProvenanceMismatch {
                resource_id,
                current,
                history,
            } => write!(
                f,
                "{resource_id}: first_collected_at {current} on current record, {history} on open interval"
            ),
            LedgerIssue::NegativeInterval {
                resource_id,
                history_id,
            } => write!(f, "{resource_id}: interval {history_id} ends before it starts"),
        }
    }
}

/// Result of verifying one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Kind that was verified.
    pub kind: ResourceKind,
    /// Number of current records scanned.
    pub current_records: usize,
    /// Number of history rows scanned.
    pub history_records: usize,
    /// Issues found, grouped by resource id.
    pub issues: Vec<LedgerIssue>,
}

impl VerifyReport {
    /// Returns true if no issue was found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Scans both tables of `kind` and reports every inconsistency.
pub(crate) fn verify_kind<T>(txn: &mut T, kind: &ResourceKind) -> StorageResult<VerifyReport>
where
    T: StoreTransaction + ?Sized,
{
    let current = txn.list_current(kind)?;
    let history = txn.all_history(kind)?;

    let mut by_resource: BTreeMap<&str, Vec<&HistoryRecord>> = BTreeMap::new();
    for row in &history {
        by_resource.entry(row.resource_id.as_str()).or_default().push(row);
    }

    let mut issues = Vec::new();
    for (resource_id, rows) in &by_resource {
        check_intervals(resource_id, rows, &mut issues);
    }

    for record in &current {
        let open: Vec<&HistoryRecord> = by_resource
            .get(record.resource_id.as_str())
            .map(|rows| rows.iter().copied().filter(|r| r.is_open()).collect())
            .unwrap_or_default();
        match open.as_slice() {
            [] => issues.push(LedgerIssue::CurrentWithoutOpenInterval {
                resource_id: record.resource_id.clone(),
            }),
            [row, ..] if row.first_collected_at != record.first_collected_at => {
                issues.push(LedgerIssue::ProvenanceMismatch {
                    resource_id: record.resource_id.clone(),
                    current: record.first_collected_at,
                    history: row.first_collected_at,
                });
            }
            _ => {}
        }
    }

    let live: BTreeSet<&str> = current.iter().map(|r| r.resource_id.as_str()).collect();
    for (resource_id, rows) in &by_resource {
        if rows.iter().any(|r| r.is_open()) && !live.contains(resource_id) {
            issues.push(LedgerIssue::OpenIntervalWithoutCurrent {
                resource_id: (*resource_id).to_string(),
            });
        }
    }

    issues.sort_by(|a, b| a.resource_id().cmp(b.resource_id()));
    Ok(VerifyReport {
        kind: kind.clone(),
        current_records: current.len(),
        history_records: history.len(),
        issues,
    })
}

fn check_intervals(resource_id: &str, rows: &[&HistoryRecord], issues: &mut Vec<LedgerIssue>) {
    let open = rows.iter().filter(|r| r.is_open()).count();
    if open > 1 {
        issues.push(LedgerIssue::MultipleOpenIntervals {
            resource_id: resource_id.to_string(),
            count: open,
        });
    }

    let mut lineages: BTreeMap<Timestamp, Vec<&HistoryRecord>> = BTreeMap::new();
    for row in rows.iter().copied() {
        if let Some(end) = row.valid_to {
            if end < row.valid_from {
                issues.push(LedgerIssue::NegativeInterval {
                    resource_id: resource_id.to_string(),
                    history_id: row.history_id,
                });
            }
        }
        lineages.entry(row.first_collected_at).or_default().push(row);
    }

    for lineage in lineages.values_mut() {
        lineage.sort_by_key(|r| r.valid_from);
        for pair in lineage.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            let issue = match first.valid_to {
                None => Some(LedgerIssue::Overlap {
                    resource_id: resource_id.to_string(),
                    first: first.history_id,
                    second: second.history_id,
                }),
                Some(end) if second.valid_from < end => Some(LedgerIssue::Overlap {
                    resource_id: resource_id.to_string(),
                    first: first.history_id,
                    second: second.history_id,
                }),
                Some(end) if second.valid_from > end => Some(LedgerIssue::Gap {
                    resource_id: resource_id.to_string(),
                    first: first.history_id,
                    second: second.history_id,
                }),
                Some(_) => None,
            };
            issues.extend(issue);
        }
    }

    check_lineages_disjoint(resource_id, rows, issues);
}

// Sweeps intervals by start time, tracking the row that reaches furthest.
// Any row of another lineage starting before that reach overlaps it.
fn check_lineages_disjoint(resource_id: &str, rows: &[&HistoryRecord], issues: &mut Vec<LedgerIssue>) {
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|r| r.valid_from);

    let mut reach: Option<&HistoryRecord> = None;
    for row in sorted {
        if let Some(prev) = reach {
            let overlaps = prev.valid_to.map_or(true, |end| row.valid_from < end);
            if overlaps && prev.first_collected_at != row.first_collected_at {
                issues.push(LedgerIssue::Overlap {
                    resource_id: resource_id.to_string(),
                    first: prev.history_id,
                    second: row.history_id,
                });
            }
        }
        let extends = match (reach.map(|r| r.valid_to), row.valid_to) {
            (None, _) => true,
            (Some(Some(end)), Some(row_end)) => row_end > end,
            (Some(Some(_)), None) => true,
            (Some(None), _) => false,
        };
        if extends {
            reach = Some(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{close_history, create_history, update_history};
    use chrono::{TimeZone, Utc};
    use snapledger_storage::{CanonicalSnapshot, CurrentRecord, MemoryStore, SnapshotStore};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn row(id: &str, from: i64, to: Option<i64>, first: i64) -> HistoryRecord {
        HistoryRecord {
            history_id: Uuid::new_v4(),
            resource_id: id.to_string(),
            fields: Default::default(),
            children: Default::default(),
            valid_from: ts(from),
            valid_to: to.map(ts),
            first_collected_at: ts(first),
        }
    }

    #[test]
    fn consistent_ledger_passes() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("vm");
        let mut txn = store.begin().unwrap();

        let v1 = CanonicalSnapshot::new("vm-1", ts(1)).with_field("size", "s");
        txn.insert_current(&kind, CurrentRecord::from_snapshot(&v1)).unwrap();
        create_history(&mut txn, &kind, &v1, ts(1)).unwrap();
        let v2 = CanonicalSnapshot::new("vm-1", ts(2)).with_field("size", "m");
        update_history(&mut txn, &kind, &CurrentRecord::from_snapshot(&v1), &v2, ts(2)).unwrap();

        // A retired resource with a closed lineage is fine too.
        let gone = CanonicalSnapshot::new("vm-2", ts(1));
        create_history(&mut txn, &kind, &gone, ts(1)).unwrap();
        close_history(&mut txn, &kind, "vm-2", ts(3)).unwrap();

        let report = verify_kind(&mut txn, &kind).unwrap();
        assert!(report.is_ok(), "{:?}", report.issues);
        assert_eq!(report.current_records, 1);
        assert_eq!(report.history_records, 3);
    }

    #[test]
    fn detects_interval_problems() {
        let mut issues = Vec::new();
        let a = row("r", 0, Some(10), 0);
        let b = row("r", 12, Some(20), 0);
        let c = row("r", 15, None, 0);
        let d = row("r", 30, Some(25), 0);
        check_intervals("r", &[&a, &b, &c, &d], &mut issues);

        assert!(issues.contains(&LedgerIssue::Gap {
            resource_id: "r".into(),
            first: a.history_id,
            second: b.history_id,
        }));
        assert!(issues.contains(&LedgerIssue::Overlap {
            resource_id: "r".into(),
            first: b.history_id,
            second: c.history_id,
        }));
        assert!(issues.contains(&LedgerIssue::NegativeInterval {
            resource_id: "r".into(),
            history_id: d.history_id,
        }));
    }

    #[test]
    fn separate_lineages_are_not_a_gap() {
        let mut issues = Vec::new();
        let old = row("r", 0, Some(10), 0);
        let reborn = row("r", 50, None, 50);
        check_intervals("r", &[&old, &reborn], &mut issues);
        assert!(issues.is_empty());
    }

    #[test]
    fn detects_overlap_between_lineages() {
        let mut issues = Vec::new();
        let old = row("r", 100, Some(260), 100);
        let reborn = row("r", 230, None, 230);
        check_intervals("r", &[&old, &reborn], &mut issues);
        assert_eq!(
            issues,
            vec![LedgerIssue::Overlap {
                resource_id: "r".into(),
                first: old.history_id,
                second: reborn.history_id,
            }]
        );

        // A reach from an earlier row of a long lineage still counts.
        let mut issues = Vec::new();
        let a1 = row("r", 0, Some(10), 0);
        let a2 = row("r", 10, Some(50), 0);
        let b = row("r", 20, Some(30), 20);
        check_intervals("r", &[&a1, &a2, &b], &mut issues);
        assert_eq!(issues.len(), 1);
        assert!(issues.contains(&LedgerIssue::Overlap {
            resource_id: "r".into(),
            first: a2.history_id,
            second: b.history_id,
        }));
    }

    #[test]
    fn detects_table_drift() {
        let store = MemoryStore::new();
        let kind = ResourceKind::new("vm");
        let mut txn = store.begin().unwrap();

        let orphan = CanonicalSnapshot::new("no-history", ts(1));
        txn.insert_current(&kind, CurrentRecord::from_snapshot(&orphan)).unwrap();

        let dangling = CanonicalSnapshot::new("no-current", ts(1));
        create_history(&mut txn, &kind, &dangling, ts(1)).unwrap();

        let skewed = CanonicalSnapshot::new("skewed", ts(1));
        let mut record = CurrentRecord::from_snapshot(&skewed);
        record.first_collected_at = ts(0);
        txn.insert_current(&kind, record).unwrap();
        create_history(&mut txn, &kind, &skewed, ts(1)).unwrap();

        let report = verify_kind(&mut txn, &kind).unwrap();
        assert_eq!(
            report.issues,
            vec![
                LedgerIssue::OpenIntervalWithoutCurrent {
                    resource_id: "no-current".into(),
                },
                LedgerIssue::CurrentWithoutOpenInterval {
                    resource_id: "no-history".into(),
                },
                LedgerIssue::ProvenanceMismatch {
                    resource_id: "skewed".into(),
                    current: ts(0),
                    history: ts(1),
                },
            ]
        );
    }
}

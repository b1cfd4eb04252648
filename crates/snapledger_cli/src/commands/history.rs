//! History command implementation.

use serde::Serialize;
use snapledger_core::SyncEngine;
use snapledger_storage::{FileStore, HistoryRecord, ResourceKind, Timestamp};
use std::path::Path;

use super::{format_ts, open_engine};

/// Intervals of one resource.
#[derive(Debug, Serialize)]
pub struct HistoryResult {
    /// Resource kind.
    pub kind: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Intervals ordered by `valid_from`.
    pub intervals: Vec<HistoryRecord>,
}

/// Runs the history command.
pub fn run(
    path: &Path,
    kind: &str,
    resource_id: &str,
    at: Option<Timestamp>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let result = history(&engine, kind, resource_id, at)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn history(
    engine: &SyncEngine<FileStore>,
    kind: &str,
    resource_id: &str,
    at: Option<Timestamp>,
) -> Result<HistoryResult, Box<dyn std::error::Error>> {
    let resource_kind = ResourceKind::new(kind);
    let intervals = match at {
        Some(at) => engine
            .history_as_of(&resource_kind, resource_id, at)?
            .into_iter()
            .collect(),
        None => engine.history(&resource_kind, resource_id)?,
    };

    Ok(HistoryResult {
        kind: kind.to_string(),
        resource_id: resource_id.to_string(),
        intervals,
    })
}

fn print_text_output(result: &HistoryResult) {
    println!("{} {}", result.kind, result.resource_id);
    if result.intervals.is_empty() {
        println!("  (no history)");
        return;
    }
    for interval in &result.intervals {
        let end = interval.valid_to.map_or_else(|| "open".to_string(), format_ts);
        println!(
            "  [{}, {})  first seen {}",
            format_ts(interval.valid_from),
            end,
            format_ts(interval.first_collected_at)
        );
        for (name, value) in &interval.fields {
            println!("      {name} = {value}");
        }
        for (name, children) in &interval.children {
            println!("      {name}: {} item(s)", children.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{seeded_store, ts};

    #[test]
    fn history_lists_every_interval() {
        let dir = seeded_store();
        let engine = open_engine(dir.path()).unwrap();
        let result = history(&engine, "compute.instance", "vm-1", None).unwrap();

        assert_eq!(result.intervals.len(), 2);
        assert_eq!(result.intervals[0].valid_to, Some(ts(60)));
        assert!(result.intervals[1].is_open());
    }

    #[test]
    fn history_at_picks_the_containing_interval() {
        let dir = seeded_store();
        let engine = open_engine(dir.path()).unwrap();

        let result = history(&engine, "compute.instance", "vm-1", Some(ts(30))).unwrap();
        assert_eq!(result.intervals.len(), 1);
        assert_eq!(result.intervals[0].valid_from, ts(0));

        let before = history(&engine, "compute.instance", "vm-1", Some(ts(-1))).unwrap();
        assert!(before.intervals.is_empty());
    }

    #[test]
    fn history_json_carries_intervals() {
        let dir = seeded_store();
        let engine = open_engine(dir.path()).unwrap();
        let result = history(&engine, "compute.instance", "vm-2", None).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["resource_id"], "vm-2");
        assert_eq!(json["intervals"].as_array().unwrap().len(), 1);
    }
}

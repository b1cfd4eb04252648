//! Stale command implementation.
//!
//! A dry run of reconciliation: lists what would be retired without
//! writing anything.

use serde::Serialize;
use snapledger_core::SyncEngine;
use snapledger_storage::{FileStore, ResourceKind, Timestamp};
use std::path::Path;

use super::{format_ts, open_engine};

/// Reconciliation preview.
#[derive(Debug, Serialize)]
pub struct StaleResult {
    /// Resource kind.
    pub kind: String,
    /// Watermark the preview used.
    pub watermark: String,
    /// Newest batch timestamp applied to the kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_watermark: Option<String>,
    /// Resources last collected before the watermark.
    pub stale: Vec<String>,
}

/// Runs the stale command.
pub fn run(
    path: &Path,
    kind: &str,
    watermark: Timestamp,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let result = stale(&engine, kind, watermark)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!(
                "{}: {} resource(s) last collected before {}",
                result.kind,
                result.stale.len(),
                result.watermark
            );
            for id in &result.stale {
                println!("  {id}");
            }
        }
    }

    Ok(())
}

fn stale(
    engine: &SyncEngine<FileStore>,
    kind: &str,
    watermark: Timestamp,
) -> Result<StaleResult, Box<dyn std::error::Error>> {
    let resource_kind = ResourceKind::new(kind);
    let high_watermark = engine.high_watermark(&resource_kind)?;
    if high_watermark.map_or(true, |high| watermark > high) {
        tracing::warn!(
            %kind,
            watermark = %format_ts(watermark),
            "watermark is ahead of every applied batch; reconciliation would be rejected"
        );
    }

    Ok(StaleResult {
        kind: kind.to_string(),
        watermark: format_ts(watermark),
        high_watermark: high_watermark.map(format_ts),
        stale: engine.stale_candidates(&resource_kind, watermark)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{seeded_store, ts};

    #[test]
    fn stale_lists_resources_missing_from_latest_run() {
        let dir = seeded_store();
        let engine = open_engine(dir.path()).unwrap();
        let result = stale(&engine, "compute.instance", ts(60)).unwrap();
        assert_eq!(result.stale, vec!["vm-2".to_string()]);
    }

    #[test]
    fn stale_does_not_write() {
        let dir = seeded_store();
        let engine = open_engine(dir.path()).unwrap();
        stale(&engine, "compute.instance", ts(60)).unwrap();

        let kind = ResourceKind::new("compute.instance");
        assert!(engine.current(&kind, "vm-2").unwrap().is_some());
        assert!(engine.history(&kind, "vm-2").unwrap()[0].is_open());
    }
}

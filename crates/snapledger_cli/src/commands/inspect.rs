//! Inspect command implementation.

use serde::Serialize;
use snapledger_core::SyncEngine;
use snapledger_storage::FileStore;
use std::path::Path;

use super::{format_ts, open_engine, selected_kinds};

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Per-kind statistics.
    pub kinds: Vec<KindStats>,
}

/// Statistics for a single resource kind.
#[derive(Debug, Serialize)]
pub struct KindStats {
    /// Resource kind.
    pub kind: String,
    /// Number of live resources.
    pub current_records: usize,
    /// Number of history intervals, open or closed.
    pub history_records: usize,
    /// Newest batch timestamp applied to the kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_watermark: Option<String>,
    /// Number of ledger inconsistencies found.
    pub issues: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, kind: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    let result = inspect(path, &engine, kind)?;

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

fn inspect(
    path: &Path,
    engine: &SyncEngine<FileStore>,
    kind: Option<&str>,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut kinds = Vec::new();
    for kind in selected_kinds(engine, kind)? {
        let report = engine.verify(&kind)?;
        kinds.push(KindStats {
            kind: kind.to_string(),
            current_records: report.current_records,
            history_records: report.history_records,
            high_watermark: engine.high_watermark(&kind)?.map(format_ts),
            issues: report.issues.len(),
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        kinds,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    if result.kinds.is_empty() {
        println!("  (empty)");
        return;
    }
    for stats in &result.kinds {
        println!();
        println!("{}", stats.kind);
        println!("  Current records: {}", stats.current_records);
        println!("  History records: {}", stats.history_records);
        println!(
            "  High watermark:  {}",
            stats.high_watermark.as_deref().unwrap_or("-")
        );
        if stats.issues > 0 {
            println!("  Issues:          {} (run verify)", stats.issues);
        }
    }
}

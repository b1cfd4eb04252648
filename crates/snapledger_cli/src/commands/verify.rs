//! Verify command implementation.

use snapledger_core::VerifyReport;
use std::path::Path;

use super::{open_engine, selected_kinds};

/// Runs the verify command.
pub fn run(path: &Path, kind: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {:?}", path);
    println!();

    let engine = open_engine(path)?;
    let mut reports = Vec::new();
    for kind in selected_kinds(&engine, kind)? {
        let report = engine.verify(&kind)?;
        print_result(&report);
        reports.push(report);
    }

    println!();
    if reports.iter().all(VerifyReport::is_ok) {
        println!("✓ Ledger verification passed");
        Ok(())
    } else {
        println!("✗ Ledger verification failed");
        Err("Verification failed".into())
    }
}

fn print_result(report: &VerifyReport) {
    println!("{}:", report.kind);
    println!("  Current records: {}", report.current_records);
    println!("  History records: {}", report.history_records);
    if report.is_ok() {
        println!("  Status: OK");
    } else {
        println!("  Status: {} issue(s)", report.issues.len());
        for issue in report.issues.iter().take(10) {
            println!("    - {issue}");
        }
        if report.issues.len() > 10 {
            println!("    ... and {} more", report.issues.len() - 10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::seeded_store;

    #[test]
    fn verify_passes_on_consistent_store() {
        let dir = seeded_store();
        assert!(run(dir.path(), None).is_ok());
    }

    #[test]
    fn verify_fails_without_store() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(run(&dir.path().join("absent"), None).is_err());
    }
}

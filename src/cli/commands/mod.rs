//! CLI command implementations
//!
//! Exit codes shared by the commands:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Run failed, retry eligible |
//! | 2 | Configuration error |
//! | 3 | Last completed run is older than the allowed age |
//! | 4 | Connection setup error |
//! | 5 | Fatal error |
//! | 130 | Interrupted by a signal |

pub mod init;
pub mod status;
pub mod sync;
pub mod validate;
pub mod watch;

use crate::adapters::database::create_destination;
use crate::adapters::source::create_source_connector;
use crate::config::PassportSyncConfig;
use crate::core::sync::{RunSummary, SyncEngine};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_RUN_FAILED: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
pub const EXIT_STALE: i32 = 3;
pub const EXIT_CONNECTION_ERROR: i32 = 4;
pub const EXIT_FATAL: i32 = 5;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Builds an engine from configuration, mapping failures to exit codes
pub(crate) fn build_engine(config: &PassportSyncConfig) -> Result<SyncEngine, i32> {
    let connector = create_source_connector(config).map_err(|e| {
        tracing::error!(error = %e, "Failed to create source connector");
        eprintln!("Failed to initialize source: {e}");
        EXIT_CONFIG_ERROR
    })?;

    let (store, state) = create_destination(config).map_err(|e| {
        tracing::error!(error = %e, "Failed to create destination store");
        eprintln!("Failed to initialize destination: {e}");
        EXIT_CONNECTION_ERROR
    })?;

    SyncEngine::from_config(config, connector, store, state).map_err(|e| {
        tracing::error!(error = %e, "Failed to create sync engine");
        eprintln!("Failed to initialize sync engine: {e}");
        EXIT_CONFIG_ERROR
    })
}

/// Prints the human-readable run report
pub(crate) fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Sync Summary:");
    println!("  Run: {}", summary.run_id);
    println!("  Mode: {}", summary.mode);
    println!("  Status: {}", summary.status);
    println!("  Observations Read: {}", summary.observations_read);
    if summary.dry_run {
        println!("  Would Insert: {}", summary.would_insert);
    } else {
        println!("  Inserted: {}", summary.inserted);
        println!("  Already Present: {}", summary.already_present);
    }
    println!("  Skipped (no match): {}", summary.skipped_no_match);
    println!("  Failed: {}", summary.failed);
    println!(
        "  Checkpoint: {}",
        summary
            .checkpoint_after
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string)
    );
    println!("  Duration: {:.2}s", summary.duration_ms as f64 / 1000.0);

    if let Some(error) = &summary.error {
        println!();
        println!("❌ Error: {error}");
    }

    if !summary.issues.is_empty() {
        println!();
        println!("⚠️  Issues:");
        for issue in summary.issues.iter().take(10) {
            let source = issue
                .source_id
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            println!("  - {:?} {}: {}", issue.kind, source, issue.message);
        }
        if summary.issues.len() > 10 {
            println!("  ... and {} more", summary.issues.len() - 10);
        }
    }
    println!();
}

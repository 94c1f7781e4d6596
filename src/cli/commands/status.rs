//! Status command implementation
//!
//! Shows the checkpoint and the outcome of the last run. With
//! `--max-age-secs` it doubles as a stall check for process managers.

use super::{EXIT_CONFIG_ERROR, EXIT_CONNECTION_ERROR, EXIT_STALE, EXIT_SUCCESS};
use crate::adapters::database::{create_destination, RecordStore, StateStorage};
use crate::config::load_config;
use crate::core::state::{StateManager, SyncState};
use crate::domain::Result;
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::sync::Arc;

/// What `status` reports for one pipeline
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub pipeline_id: String,
    pub records_total: u64,
    pub state: Option<SyncState>,
}

impl StatusReport {
    pub async fn load(
        records: &Arc<dyn RecordStore>,
        state_storage: Arc<dyn StateStorage>,
        pipeline_id: &str,
    ) -> Result<Self> {
        let state = StateManager::new(state_storage).load(pipeline_id).await?;
        let records_total = records.count_records(None).await?;
        Ok(Self {
            pipeline_id: pipeline_id.to_string(),
            records_total,
            state,
        })
    }
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the pipeline state as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit with code 3 if no run completed within this many seconds
    #[arg(long)]
    pub max_age_secs: Option<u64>,
}

impl StatusArgs {
    /// Exit code for the loaded state
    pub fn exit_code(&self, state: Option<&SyncState>) -> i32 {
        let Some(max_age_secs) = self.max_age_secs else {
            return EXIT_SUCCESS;
        };
        let max_age = chrono::Duration::seconds(max_age_secs as i64);
        match state {
            Some(state) if !state.is_stale(max_age, Utc::now()) => EXIT_SUCCESS,
            _ => EXIT_STALE,
        }
    }

    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        let (records, state_storage) = match create_destination(&config) {
            Ok(d) => d,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(EXIT_CONNECTION_ERROR);
            }
        };

        let report =
            match StatusReport::load(&records, state_storage, &config.sync.pipeline_id).await {
                Ok(report) => report,
                Err(e) => {
                    println!("❌ Failed to load sync state");
                    println!("   Error: {e}");
                    return Ok(EXIT_CONNECTION_ERROR);
                }
            };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        let code = self.exit_code(report.state.as_ref());
        if code == EXIT_STALE && !self.json {
            println!("⚠️  No run completed in the last {}s", self.max_age_secs.unwrap_or(0));
        }
        Ok(code)
    }
}

fn print_report(report: &StatusReport) {
    println!("📊 Sync Status: {}", report.pipeline_id);
    println!();
    println!("  Records in Destination: {}", report.records_total);

    let Some(state) = &report.state else {
        println!("No sync history found.");
        println!("Run 'passport-sync sync' to start syncing observations.");
        return;
    };

    let format_time = |at: Option<chrono::DateTime<Utc>>| {
        at.map_or_else(
            || "Never".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
    };

    println!("  Last Run Status: {}", state.last_run_status);
    println!("  Last Run Started: {}", format_time(state.last_run_started_at));
    println!("  Last Run Completed: {}", format_time(state.last_run_completed_at));
    println!("  Last Success: {}", format_time(state.last_success_at));
    println!(
        "  Checkpoint: {}",
        state
            .checkpoint
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string)
    );
    println!("  Total Runs: {}", state.runs_total);
    println!("  Total Records Inserted: {}", state.records_inserted_total);

    if let Some(run) = &state.last_run {
        println!();
        println!("  Last Run:");
        println!("    Inserted: {}", run.inserted);
        println!("    Already Present: {}", run.already_present);
        println!("    Skipped (no match): {}", run.skipped_no_match);
        println!("    Failed: {}", run.failed);
        if let Some(error) = &run.error {
            println!("    Error: {error}");
        }
    }
    println!();
}

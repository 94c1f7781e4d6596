//! Sync command implementation
//!
//! Runs one bounded sync pass and exits. Suited to cron or a process
//! manager that restarts the worker on its own schedule.

use super::{build_engine, print_summary, EXIT_CONFIG_ERROR, EXIT_RUN_FAILED, EXIT_SUCCESS};
use crate::config::load_config;
use crate::core::supervisor::{Supervisor, SupervisorConfig};
use crate::core::sync::SyncMode;
use crate::domain::SourcePersonId;
use clap::Args;
use std::sync::Arc;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Read the whole source history instead of resuming from the checkpoint
    #[arg(long)]
    pub full: bool,

    /// Read and resolve, but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Sync the complete history of one source person, leaving the
    /// checkpoint alone
    #[arg(long, value_name = "SOURCE_PERSON_ID", conflicts_with = "full")]
    pub person: Option<SourcePersonId>,
}

impl SyncArgs {
    pub fn mode(&self) -> SyncMode {
        if self.full {
            SyncMode::FullHistory
        } else {
            SyncMode::Incremental
        }
    }

    /// Execute the sync command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting sync command");

        let mut config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
            println!("🔍 DRY RUN MODE - No records will be written");
            println!();
        }

        let engine = match build_engine(&config) {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };

        if let Some(person) = &self.person {
            println!("🚀 Starting sync for source person {person}...");
            let summary = engine.sync_person(person).await;
            print_summary(&summary);
            return Ok(if summary.is_successful() {
                println!("✅ Person sync completed successfully!");
                EXIT_SUCCESS
            } else {
                println!("⚠️  Person sync failed");
                EXIT_RUN_FAILED
            });
        }

        // A single run still honors the run time limit
        let supervisor = Supervisor::new(
            Arc::new(engine),
            SupervisorConfig::from_config(&config.sync),
        );

        println!("🚀 Starting {} sync...", self.mode());
        let summary = supervisor.run_once(self.mode()).await;
        print_summary(&summary);

        if summary.is_successful() {
            println!("✅ Sync completed successfully!");
            Ok(EXIT_SUCCESS)
        } else {
            println!("⚠️  Sync failed; the next run resumes from the last checkpoint");
            Ok(EXIT_RUN_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_args_mode() {
        let args = SyncArgs {
            full: false,
            dry_run: false,
            person: None,
        };
        assert_eq!(args.mode(), SyncMode::Incremental);

        let args = SyncArgs {
            full: true,
            dry_run: true,
            person: None,
        };
        assert_eq!(args.mode(), SyncMode::FullHistory);
    }

    #[tokio::test]
    async fn test_missing_config_is_config_error() {
        let args = SyncArgs {
            full: false,
            dry_run: false,
            person: None,
        };
        let code = args.execute("/nonexistent/passport-sync.toml").await.unwrap();
        assert_eq!(code, EXIT_CONFIG_ERROR);
    }
}

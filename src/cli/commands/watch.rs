//! Watch command implementation
//!
//! Runs the supervisor loop until a shutdown signal, the run limit or the
//! consecutive-failure limit.

use super::{build_engine, EXIT_CONFIG_ERROR, EXIT_INTERRUPTED, EXIT_RUN_FAILED, EXIT_SUCCESS};
use crate::config::load_config;
use crate::core::supervisor::{Supervisor, SupervisorConfig, SupervisorExit};
use crate::core::sync::SyncMode;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Override the configured interval between runs
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Exit after this many runs
    #[arg(long)]
    pub max_runs: Option<u64>,

    /// Make the first run read the whole source history
    #[arg(long)]
    pub full_first: bool,
}

impl WatchArgs {
    /// Supervisor settings with the CLI overrides applied
    pub fn supervisor_config(&self, base: SupervisorConfig) -> SupervisorConfig {
        SupervisorConfig {
            interval: self.interval_secs.map_or(base.interval, Duration::from_secs),
            max_runs: self.max_runs.or(base.max_runs),
            ..base
        }
    }

    /// Execute the watch command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting watch command");

        let config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        if self.interval_secs == Some(0) {
            eprintln!("Configuration error: --interval-secs must be > 0");
            return Ok(EXIT_CONFIG_ERROR);
        }

        let engine = match build_engine(&config) {
            Ok(engine) => engine,
            Err(code) => return Ok(code),
        };

        let supervisor_config =
            self.supervisor_config(SupervisorConfig::from_config(&config.sync));
        println!(
            "👀 Syncing every {}s (Ctrl+C to stop)...",
            supervisor_config.interval.as_secs()
        );

        let first_mode = if self.full_first {
            SyncMode::FullHistory
        } else {
            SyncMode::Incremental
        };

        let supervisor = Supervisor::new(Arc::new(engine), supervisor_config);
        let handle = supervisor.handle();
        let exit = supervisor.run(shutdown_signal, first_mode).await;
        let status = handle.status();

        println!();
        println!("📊 Watch Summary:");
        println!("  Runs: {}", status.total_runs);
        println!("  Consecutive Failures: {}", status.consecutive_failures);
        println!();

        let code = match exit {
            SupervisorExit::Shutdown => {
                println!("⚠️  Stopped by signal. Progress up to the last successful run is saved.");
                EXIT_INTERRUPTED
            }
            SupervisorExit::MaxRunsReached => {
                println!("✅ Completed the requested number of runs");
                EXIT_SUCCESS
            }
            SupervisorExit::TooManyFailures(failures) => {
                println!("❌ Stopping after {failures} consecutive failed runs");
                EXIT_RUN_FAILED
            }
        };

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SupervisorConfig {
        SupervisorConfig {
            interval: Duration::from_secs(10),
            max_run_duration: Duration::from_secs(300),
            max_consecutive_failures: 3,
            max_runs: None,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let args = WatchArgs {
            interval_secs: Some(2),
            max_runs: Some(4),
            full_first: false,
        };
        let config = args.supervisor_config(base());
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.max_runs, Some(4));
        assert_eq!(config.max_consecutive_failures, 3);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let args = WatchArgs {
            interval_secs: None,
            max_runs: None,
            full_first: true,
        };
        let config = args.supervisor_config(base());
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.max_runs, None);
    }
}

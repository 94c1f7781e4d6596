//! CLI interface and argument parsing

pub mod commands;

use clap::{Parser, Subcommand};

/// Passport Sync - OpenMRS to Patient Passport observation sync
#[derive(Parser, Debug)]
#[command(name = "passport-sync")]
#[command(version, about, long_about = None)]
#[command(author = "Passport Sync Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "passport-sync.toml", env = "PASSPORT_SYNC_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PASSPORT_SYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sync pass and exit
    Sync(commands::sync::SyncArgs),

    /// Sync on an interval until stopped
    Watch(commands::watch::WatchArgs),

    /// Show the outcome of the last run
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::validate::ValidateArgs;

    #[test]
    fn test_cli_parse_sync() {
        let cli = Cli::parse_from(["passport-sync", "sync"]);
        assert_eq!(cli.config, "passport-sync.toml");
        match cli.command {
            Commands::Sync(args) => {
                assert!(!args.full);
                assert!(!args.dry_run);
                assert!(args.person.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_sync_flags() {
        let cli = Cli::parse_from(["passport-sync", "sync", "--full", "--dry-run"]);
        match cli.command {
            Commands::Sync(args) => {
                assert!(args.full);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_sync_person() {
        let cli = Cli::parse_from(["passport-sync", "sync", "--person", "102"]);
        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.person.unwrap().as_str(), "102");
                assert!(!args.full);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["passport-sync", "sync", "--person", "102", "--full"]).is_err());
        assert!(Cli::try_parse_from(["passport-sync", "sync", "--person", " "]).is_err());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["passport-sync", "--config", "custom.toml", "sync"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["passport-sync", "--log-level", "debug", "status"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_watch() {
        let cli = Cli::parse_from([
            "passport-sync",
            "watch",
            "--interval-secs",
            "30",
            "--max-runs",
            "5",
        ]);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.interval_secs, Some(30));
                assert_eq!(args.max_runs, Some(5));
                assert!(!args.full_first);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["passport-sync", "status", "--json", "--max-age-secs", "60"]);
        match cli.command {
            Commands::Status(args) => {
                assert!(args.json);
                assert_eq!(args.max_age_secs, Some(60));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["passport-sync", "validate-config"]);
        assert!(matches!(
            cli.command,
            Commands::ValidateConfig(ValidateArgs {
                test_connections: false
            })
        ));

        let cli = Cli::parse_from(["passport-sync", "validate-config", "--test-connections"]);
        assert!(matches!(
            cli.command,
            Commands::ValidateConfig(ValidateArgs {
                test_connections: true
            })
        ));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["passport-sync", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}

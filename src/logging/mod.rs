//! Logging and observability
//!
//! ```no_run
//! use passport_sync::logging::init_logging;
//! use passport_sync::config::LoggingConfig;
//!
//! let _guard = init_logging("info", &LoggingConfig::default()).expect("logging");
//! tracing::info!(pipeline = "openmrs_observations", "Worker started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a sync run
///
/// ```no_run
/// use passport_sync::log_run_start;
///
/// let run_id = uuid::Uuid::new_v4();
/// log_run_start!(run_id, "incremental", "2024-03-01T09:00:00Z#5268");
/// ```
#[macro_export]
macro_rules! log_run_start {
    ($run_id:expr, $mode:expr, $since:expr) => {
        tracing::info!(
            run_id = %$run_id,
            mode = %$mode,
            since = %$since,
            "Starting sync run"
        );
    };
}

/// Log the completion of a sync run with its counts
#[macro_export]
macro_rules! log_run_complete {
    ($summary:expr) => {
        tracing::info!(
            run_id = %$summary.run_id,
            status = %$summary.status,
            read = $summary.observations_read,
            inserted = $summary.inserted,
            already_present = $summary.already_present,
            skipped_no_match = $summary.skipped_no_match,
            failed = $summary.failed,
            duration_ms = $summary.duration_ms,
            "Sync run finished"
        );
    };
}

/// Log a retry attempt
///
/// ```no_run
/// use passport_sync::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}

//! Configuration schema types
//!
//! Maps one-to-one onto the sections of `passport-sync.toml`.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};

/// Runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Which OpenMRS interface the source reader talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Direct SQL against the OpenMRS database
    #[default]
    Database,
    /// The OpenMRS REST web services
    Rest,
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassportSyncConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: Environment,

    /// OpenMRS source settings
    pub source: SourceConfig,

    /// Patient Passport destination store
    pub destination: PostgreSQLConfig,

    /// Scheduling and run bounds
    #[serde(default)]
    pub sync: SchedulerConfig,

    /// Extra concept keywords for record categorization
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PassportSyncConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.source.validate(&self.environment)?;
        self.destination.validate("destination")?;
        self.sync.validate()?;
        self.mapping.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (read and resolve, but write nothing)
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Source reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// `database` or `rest`
    #[serde(default)]
    pub kind: SourceKind,

    /// Name recorded in record provenance
    #[serde(default = "default_system_name")]
    pub system_name: String,

    /// Observations fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Locale for concept names
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Look-back window for the first incremental run of a pipeline that has
    /// no checkpoint yet. Unset means the first run reads the full history.
    #[serde(default)]
    pub initial_lookback_hours: Option<u64>,

    /// Required when `kind = "database"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PostgreSQLConfig>,

    /// Required when `kind = "rest"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<OpenMrsRestConfig>,
}

impl SourceConfig {
    fn validate(&self, environment: &Environment) -> Result<(), String> {
        if self.system_name.trim().is_empty() {
            return Err("source.system_name cannot be empty".to_string());
        }

        if !(1..=5000).contains(&self.page_size) {
            return Err(format!(
                "source.page_size must be between 1 and 5000, got {}",
                self.page_size
            ));
        }

        if self.locale.trim().is_empty() {
            return Err("source.locale cannot be empty".to_string());
        }

        match self.kind {
            SourceKind::Database => match &self.database {
                Some(database) => database.validate("source.database")?,
                None => {
                    return Err(
                        "source.database configuration is required when source.kind = 'database'"
                            .to_string(),
                    )
                }
            },
            SourceKind::Rest => match &self.rest {
                Some(rest) => rest.validate(environment)?,
                None => {
                    return Err(
                        "source.rest configuration is required when source.kind = 'rest'"
                            .to_string(),
                    )
                }
            },
        }

        Ok(())
    }
}

/// Retry configuration for REST requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// OpenMRS REST web services configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenMrsRestConfig {
    /// Base URL of the OpenMRS webapp, e.g. `http://localhost:8080/openmrs`
    pub base_url: String,

    pub username: String,

    pub password: SecretString,

    #[serde(default = "default_rest_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TLS certificate verification. Cannot be disabled in production.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl OpenMrsRestConfig {
    fn validate(&self, environment: &Environment) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if url::Url::parse(&self.base_url).is_err() {
            return Err(format!(
                "source.rest.base_url is not a valid URL: '{}'",
                self.base_url
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("source.rest.base_url must start with http:// or https://".to_string());
        }

        if self.username.is_empty() {
            return Err("source.rest.username cannot be empty".to_string());
        }

        if self.password.expose_secret().is_empty() {
            return Err("source.rest.password cannot be empty".to_string());
        }

        if self.timeout_seconds == 0 {
            return Err("source.rest.timeout_seconds must be > 0".to_string());
        }

        if self.retry.max_retries > 10 {
            return Err(format!(
                "source.rest.retry.max_retries must be <= 10, got {}",
                self.retry.max_retries
            ));
        }

        if *environment == Environment::Production && !self.tls_verify {
            return Err(
                "TLS certificate verification cannot be disabled in production environments. \
                Set 'tls_verify = true', or use environment = \"development\" or \"staging\"."
                    .to_string(),
            );
        }

        Ok(())
    }
}

/// PostgreSQL connection configuration
///
/// Used for the destination store and for the OpenMRS database reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgreSQLConfig {
    pub connection_string: SecretString,

    #[serde(default = "default_pg_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_pg_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,

    #[serde(default = "default_pg_statement_timeout_seconds")]
    pub statement_timeout_seconds: u64,

    #[serde(default = "default_pg_ssl_mode")]
    pub ssl_mode: String,
}

impl PostgreSQLConfig {
    fn validate(&self, section: &str) -> Result<(), String> {
        use secrecy::ExposeSecret;

        let conn_str = self.connection_string.expose_secret();

        if conn_str.is_empty() {
            return Err(format!("{section}.connection_string cannot be empty"));
        }

        if !conn_str.starts_with("postgresql://") && !conn_str.starts_with("postgres://") {
            return Err(format!(
                "{section}.connection_string must start with postgresql:// or postgres://"
            ));
        }

        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(format!(
                "{section}.max_connections must be between 1 and 100, got {}",
                self.max_connections
            ));
        }

        if self.connection_timeout_seconds == 0 || self.statement_timeout_seconds == 0 {
            return Err(format!("{section} timeouts must be > 0"));
        }

        let valid_ssl_modes = ["disable", "prefer", "require", "verify-full"];
        if !valid_ssl_modes.contains(&self.ssl_mode.as_str()) {
            return Err(format!(
                "{section}.ssl_mode must be one of: {}, got '{}'",
                valid_ssl_modes.join(", "),
                self.ssl_mode
            ));
        }

        Ok(())
    }
}

/// `[sync]` section: scheduling and run bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Key of the persisted checkpoint
    #[serde(default = "default_pipeline_id")]
    pub pipeline_id: String,

    /// Seconds between scheduled runs
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// A run taking longer than this is abandoned and counted as failed
    #[serde(default = "default_max_run_duration_seconds")]
    pub max_run_duration_seconds: u64,

    /// Exit the watch loop after this many failed runs in a row (0 = never)
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pipeline_id: default_pipeline_id(),
            interval_seconds: default_interval_seconds(),
            max_run_duration_seconds: default_max_run_duration_seconds(),
            max_consecutive_failures: 0,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.pipeline_id.trim().is_empty() {
            return Err("sync.pipeline_id cannot be empty".to_string());
        }
        if self.interval_seconds == 0 {
            return Err("sync.interval_seconds must be > 0".to_string());
        }
        if self.max_run_duration_seconds == 0 {
            return Err("sync.max_run_duration_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// `[mapping]` section: keywords added to the built-in category rules
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MappingConfig {
    #[serde(default)]
    pub condition_keywords: Vec<String>,

    #[serde(default)]
    pub medication_keywords: Vec<String>,

    #[serde(default)]
    pub vital_sign_keywords: Vec<String>,

    #[serde(default)]
    pub lab_result_keywords: Vec<String>,

    #[serde(default)]
    pub visit_keywords: Vec<String>,
}

impl MappingConfig {
    fn validate(&self) -> Result<(), String> {
        let all = self
            .condition_keywords
            .iter()
            .chain(&self.medication_keywords)
            .chain(&self.vital_sign_keywords)
            .chain(&self.lab_result_keywords)
            .chain(&self.visit_keywords);
        for keyword in all {
            if keyword.trim().is_empty() {
                return Err("mapping keywords cannot be empty strings".to_string());
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs to rolling files in `local_path`
    #[serde(default)]
    pub local_enabled: bool,

    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// `daily` or `hourly`
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local_enabled = true".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_system_name() -> String {
    "openmrs".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_rest_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_pg_max_connections() -> usize {
    4
}

fn default_pg_connection_timeout_seconds() -> u64 {
    10
}

fn default_pg_statement_timeout_seconds() -> u64 {
    30
}

fn default_pg_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_pipeline_id() -> String {
    "openmrs_observations".to_string()
}

fn default_interval_seconds() -> u64 {
    10
}

fn default_max_run_duration_seconds() -> u64 {
    300
}

fn default_local_path() -> String {
    "/var/log/passport-sync".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

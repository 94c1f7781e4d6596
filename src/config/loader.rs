//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{Environment, PassportSyncConfig, SourceKind};
use super::secret_string;
use crate::domain::errors::EngineError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// 1. Reads the file
/// 2. Substitutes `${VAR}` placeholders from the environment
/// 3. Parses the TOML into [`PassportSyncConfig`]
/// 4. Applies `PASSPORT_SYNC_*` environment overrides
/// 5. Validates the result
///
/// # Examples
///
/// ```no_run
/// use passport_sync::config::loader::load_config;
///
/// let config = load_config("passport-sync.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<PassportSyncConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EngineError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        EngineError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: PassportSyncConfig = toml::from_str(&contents)?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        EngineError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched. All missing variables are reported at once.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| EngineError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    cap[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(EngineError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            EngineError::Configuration(format!("Invalid value for {name}: '{raw}'"))
        }),
        None => Ok(None),
    }
}

/// Applies environment variable overrides using the `PASSPORT_SYNC_*` prefix
///
/// Variables follow `PASSPORT_SYNC_<SECTION>_<KEY>`, for example
/// `PASSPORT_SYNC_SYNC_INTERVAL_SECONDS` or `PASSPORT_SYNC_DESTINATION_CONNECTION_STRING`.
fn apply_env_overrides(config: &mut PassportSyncConfig) -> Result<()> {
    // Application
    if let Some(val) = env("PASSPORT_SYNC_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }
    if let Some(val) = env("PASSPORT_SYNC_ENVIRONMENT") {
        config.environment = match val.to_lowercase().as_str() {
            "development" => Environment::Development,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(EngineError::Configuration(format!(
                    "Invalid value for PASSPORT_SYNC_ENVIRONMENT: '{other}'"
                )))
            }
        };
    }

    // Source
    if let Some(val) = env("PASSPORT_SYNC_SOURCE_KIND") {
        config.source.kind = match val.to_lowercase().as_str() {
            "database" => SourceKind::Database,
            "rest" => SourceKind::Rest,
            other => {
                return Err(EngineError::Configuration(format!(
                    "Invalid value for PASSPORT_SYNC_SOURCE_KIND: '{other}'"
                )))
            }
        };
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_SOURCE_PAGE_SIZE")? {
        config.source.page_size = val;
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_SOURCE_INITIAL_LOOKBACK_HOURS")? {
        config.source.initial_lookback_hours = Some(val);
    }
    if let Some(ref mut database) = config.source.database {
        if let Some(val) = env("PASSPORT_SYNC_SOURCE_DATABASE_CONNECTION_STRING") {
            database.connection_string = secret_string(val);
        }
    }
    if let Some(ref mut rest) = config.source.rest {
        if let Some(val) = env("PASSPORT_SYNC_SOURCE_REST_BASE_URL") {
            rest.base_url = val;
        }
        if let Some(val) = env("PASSPORT_SYNC_SOURCE_REST_USERNAME") {
            rest.username = val;
        }
        if let Some(val) = env("PASSPORT_SYNC_SOURCE_REST_PASSWORD") {
            rest.password = secret_string(val);
        }
    }

    // Destination
    if let Some(val) = env("PASSPORT_SYNC_DESTINATION_CONNECTION_STRING") {
        config.destination.connection_string = secret_string(val);
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_DESTINATION_MAX_CONNECTIONS")? {
        config.destination.max_connections = val;
    }

    // Scheduler
    if let Some(val) = env("PASSPORT_SYNC_SYNC_PIPELINE_ID") {
        config.sync.pipeline_id = val;
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_SYNC_INTERVAL_SECONDS")? {
        config.sync.interval_seconds = val;
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_SYNC_MAX_RUN_DURATION_SECONDS")? {
        config.sync.max_run_duration_seconds = val;
    }
    if let Some(val) = env_parsed("PASSPORT_SYNC_SYNC_MAX_CONSECUTIVE_FAILURES")? {
        config.sync.max_consecutive_failures = val;
    }

    // Logging
    if let Some(val) = env_parsed("PASSPORT_SYNC_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env("PASSPORT_SYNC_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("LOADER_TEST_PASSWORD", "s3cret");
        let input = "password = \"${LOADER_TEST_PASSWORD}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"s3cret\"\n");
        std::env::remove_var("LOADER_TEST_PASSWORD");
    }

    #[test]
    fn test_substitute_env_vars_reports_all_missing() {
        let input = "a = \"${LOADER_MISSING_ONE}\"\nb = \"${LOADER_MISSING_TWO}\"";
        let err = substitute_env_vars(input).unwrap_err().to_string();
        assert!(err.contains("LOADER_MISSING_ONE"));
        assert!(err.contains("LOADER_MISSING_TWO"));
    }

    #[test]
    fn test_substitute_env_vars_skips_comments() {
        let input = "# password = \"${LOADER_ONLY_IN_COMMENT}\"\nkind = \"rest\"";
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("${LOADER_ONLY_IN_COMMENT}"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-passport-sync.toml");
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[source]
kind = "rest"

[source.rest]
base_url = "http://localhost:8080/openmrs"
username = "admin"
password = "Admin123"

[destination]
connection_string = "postgresql://sync:pw@localhost:5432/passport"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.source.kind, SourceKind::Rest);
        assert_eq!(config.source.page_size, 100);
        assert_eq!(config.sync.interval_seconds, 10);
        assert_eq!(config.application.log_level, "info");
    }
}

//! Source connector factory

use crate::adapters::openmrs::{DatabaseConnector, RestConnector};
use crate::adapters::source::SourceConnector;
use crate::config::{PassportSyncConfig, SourceKind};
use crate::domain::{EngineError, Result};
use std::sync::Arc;

/// Create the source connector selected by `source.kind`
///
/// # Errors
///
/// Returns a configuration error if the section for the selected kind is
/// missing.
pub fn create_source_connector(config: &PassportSyncConfig) -> Result<Arc<dyn SourceConnector>> {
    let source = &config.source;

    match source.kind {
        SourceKind::Database => {
            let database = source.database.as_ref().ok_or_else(|| {
                EngineError::Configuration(
                    "source.database configuration is required when source.kind = 'database'"
                        .to_string(),
                )
            })?;

            tracing::info!(locale = %source.locale, "Using OpenMRS database source");
            Ok(Arc::new(DatabaseConnector::new(
                database.clone(),
                source.locale.clone(),
            )))
        }
        SourceKind::Rest => {
            let rest = source.rest.as_ref().ok_or_else(|| {
                EngineError::Configuration(
                    "source.rest configuration is required when source.kind = 'rest'".to_string(),
                )
            })?;

            tracing::info!(base_url = %rest.base_url, "Using OpenMRS REST source");
            Ok(Arc::new(RestConnector::new(rest.clone())))
        }
    }
}

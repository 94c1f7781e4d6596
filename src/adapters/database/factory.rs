//! Destination store factory

use crate::adapters::database::traits::{RecordStore, StateStorage};
use crate::adapters::postgresql::{PoolRole, PostgreSQLAdapter, PostgreSQLClient};
use crate::config::PassportSyncConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Create the record store and state storage over one shared pool
///
/// # Errors
///
/// Returns an error if the connection string or TLS settings are invalid.
/// No connection is opened here.
pub fn create_destination(
    config: &PassportSyncConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<dyn StateStorage>)> {
    tracing::info!("Creating PostgreSQL destination store and state storage");

    let client = Arc::new(PostgreSQLClient::new(
        config.destination.clone(),
        PoolRole::Destination,
    )?);
    let adapter = Arc::new(PostgreSQLAdapter::new_with_arc(client));

    Ok((
        adapter.clone() as Arc<dyn RecordStore>,
        adapter as Arc<dyn StateStorage>,
    ))
}

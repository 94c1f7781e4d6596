//! State manager for sync state persistence

use crate::adapters::database::traits::StateStorage;
use crate::core::state::checkpoint::SyncState;
use crate::domain::Result;
use std::sync::Arc;

/// Loads and saves [`SyncState`] through a [`StateStorage`] backend
pub struct StateManager {
    storage: Arc<dyn StateStorage>,
}

impl StateManager {
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self { storage }
    }

    /// Loads the state of a pipeline, starting a fresh one if none is stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::EngineError::State`] if the backend read fails.
    pub async fn load_or_init(&self, pipeline_id: &str) -> Result<SyncState> {
        Ok(self
            .storage
            .load_state(pipeline_id)
            .await?
            .unwrap_or_else(|| SyncState::new(pipeline_id)))
    }

    /// Loads the state of a pipeline, if any
    pub async fn load(&self, pipeline_id: &str) -> Result<Option<SyncState>> {
        self.storage.load_state(pipeline_id).await
    }

    /// Saves pipeline state. In dry-run mode nothing is written.
    pub async fn save(&self, state: &SyncState, dry_run: bool) -> Result<()> {
        if dry_run {
            tracing::debug!(pipeline = %state.id, "DRY RUN: Would save sync state");
            return Ok(());
        }

        tracing::debug!(
            pipeline = %state.id,
            status = %state.last_run_status,
            checkpoint = ?state.checkpoint.as_ref().map(|c| c.to_string()),
            "Saving sync state"
        );
        self.storage.save_state(state).await
    }
}

// Sync state and checkpoint tracking

pub mod checkpoint;
pub mod manager;

pub use checkpoint::{RunStatus, SyncState, SyncStateBuilder};
pub use manager::StateManager;

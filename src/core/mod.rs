//! Core sync logic.
//!
//! # Modules
//!
//! - [`identity`] - Matching source persons to destination patients
//! - [`mapping`] - Observation to clinical record mapping
//! - [`state`] - Pipeline state and checkpoints
//! - [`sync`] - The sync engine and run summaries
//! - [`supervisor`] - Interval scheduling with run timeouts
//!
//! # Run Workflow
//!
//! 1. **Load State**: Read the pipeline checkpoint
//! 2. **Read**: Stream observations after the checkpoint, in ingestion order
//! 3. **Resolve**: Find or link the destination patient
//! 4. **Map**: Categorize the concept and build the record
//! 5. **Write**: Insert unless a record for the observation already exists
//! 6. **Checkpoint**: Advance the checkpoint if the run succeeded
//!
//! # Example
//!
//! ```rust,no_run
//! use passport_sync::adapters::database::create_destination;
//! use passport_sync::adapters::source::create_source_connector;
//! use passport_sync::config::load_config;
//! use passport_sync::core::sync::{SyncEngine, SyncMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("passport-sync.toml")?;
//! let connector = create_source_connector(&config)?;
//! let (store, state) = create_destination(&config)?;
//!
//! let engine = SyncEngine::from_config(&config, connector, store, state)?;
//! let summary = engine.execute(SyncMode::Incremental).await;
//!
//! println!("Inserted: {}", summary.inserted);
//! # Ok(())
//! # }
//! ```

pub mod identity;
pub mod mapping;
pub mod state;
pub mod supervisor;
pub mod sync;

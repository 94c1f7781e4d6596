// Passport Sync - OpenMRS to Patient Passport clinical observation sync
// Copyright (c) 2025 Passport Sync Contributors
// Licensed under the MIT License

//! # Passport Sync
//!
//! Keeps a Patient Passport record store up to date with clinical observations
//! recorded in an OpenMRS EMR.
//!
//! ## Overview
//!
//! Each run:
//! - **Reads** observations recorded after the pipeline checkpoint, from the
//!   OpenMRS database or its REST web services
//! - **Resolves** the person behind each observation to a destination patient,
//!   linking the two on the first unambiguous name match
//! - **Maps** the observation to a categorized clinical record with provenance
//! - **Writes** the record unless one already exists for that observation
//! - **Checkpoints** the last observation seen, only when the run succeeds
//!
//! Writes are keyed by `(patient, source observation)`, so replaying any part
//! of the source history never creates duplicates.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Sync engine, identity resolution, mapping, state and scheduling
//! - [`adapters`] - OpenMRS readers, the PostgreSQL destination, in-memory stores
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use passport_sync::adapters::database::create_destination;
//! use passport_sync::adapters::source::create_source_connector;
//! use passport_sync::config::load_config;
//! use passport_sync::core::sync::{SyncEngine, SyncMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("passport-sync.toml")?;
//!
//!     let connector = create_source_connector(&config)?;
//!     let (store, state) = create_destination(&config)?;
//!     let engine = SyncEngine::from_config(&config, connector, store, state)?;
//!
//!     let summary = engine.execute(SyncMode::Incremental).await;
//!     println!(
//!         "Inserted {}, already present {}, skipped {}",
//!         summary.inserted, summary.already_present, summary.skipped_no_match
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fallible library calls return [`domain::Result`], whose error is
//! [`domain::EngineError`]. A sync run itself never returns an error; failures
//! are reported in its [`core::sync::RunSummary`].
//!
//! ## Logging
//!
//! Structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! tracing::info!(pipeline_id = "openmrs_observations", "Starting sync");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;

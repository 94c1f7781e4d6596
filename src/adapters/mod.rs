//! External system integrations.
//!
//! - [`source`] - source reader traits and the connector factory
//! - [`openmrs`] - OpenMRS database and REST readers
//! - [`database`] - destination store traits and factory
//! - [`postgresql`] - PostgreSQL pool client and destination store
//! - [`memory`] - in-process source and destination
//!
//! # Design Pattern
//!
//! Adapters isolate drivers and HTTP behind traits. Errors leave an adapter as
//! [`crate::domain::SourceError`] or [`crate::domain::DestinationError`].
//!
//! ```rust
//! use passport_sync::adapters::memory::{MemoryRecordStore, MemorySource};
//! use passport_sync::adapters::database::RecordStore;
//! use passport_sync::adapters::source::SourceConnector;
//!
//! # async fn example() -> passport_sync::domain::Result<()> {
//! let source = MemorySource::new();
//! let reader = source.connect().await?;
//! let store = MemoryRecordStore::new();
//! assert_eq!(store.count_records(None).await?, 0);
//! # let _ = reader;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod memory;
pub mod openmrs;
pub mod postgresql;
pub mod source;

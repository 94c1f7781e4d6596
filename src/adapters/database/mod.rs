//! Destination store abstraction
//!
//! Trait seams for the patient-record store, so the engine runs the same
//! against PostgreSQL and the in-memory store.

pub mod factory;
pub mod traits;

pub use factory::create_destination;
pub use traits::{RecordStore, StateStorage};

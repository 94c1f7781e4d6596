//! OpenMRS source readers
//!
//! Two ways into the same data:
//!
//! - [`database`] reads the OpenMRS tables over SQL
//! - [`rest`] uses the OpenMRS REST web services
//!
//! Both only ever read from the source.

pub mod database;
pub mod models;
pub mod rest;

pub use database::{DatabaseConnector, DatabaseObservationSource};
pub use rest::{RestConnector, RestObservationSource};

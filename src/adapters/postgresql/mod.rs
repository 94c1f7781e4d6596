//! PostgreSQL integration
//!
//! The pooled [`PostgreSQLClient`] backs both the destination store
//! ([`PostgreSQLAdapter`]) and the OpenMRS database reader.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::{PoolRole, PostgreSQLClient};
pub use models::{ClinicalRecordRow, PatientRow};

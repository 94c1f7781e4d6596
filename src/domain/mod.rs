//! Domain models and types for the sync engine.
//!
//! # Overview
//!
//! - **Strongly-typed identifiers** ([`SourceObservationId`], [`SourcePersonId`],
//!   [`PatientId`], [`RecordId`])
//! - **Source side** ([`SourceObservation`], [`SourcePerson`], [`ObservationValue`],
//!   [`SourceCursor`])
//! - **Destination side** ([`DestinationPatient`], [`DestinationRecord`], [`RecordType`])
//! - **Error types** ([`EngineError`], [`SourceError`], [`DestinationError`])
//! - **Result type alias** ([`Result`])
//!
//! Identifiers are newtypes so a source person id can never be passed where a
//! destination patient id is expected:
//!
//! ```rust
//! use passport_sync::domain::{PatientId, SourcePersonId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let person = SourcePersonId::new("102")?;
//! let patient = PatientId::new("P1")?;
//!
//! // let wrong: PatientId = person;  // Compile error!
//! # let _ = (person, patient);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod observation;
pub mod patient;
pub mod record;
pub mod result;

pub use errors::{DestinationError, EngineError, SourceError};
pub use ids::{PatientId, RecordId, SourceObservationId, SourcePersonId};
pub use observation::{
    ObservationValue, SourceCursor, SourceObservation, SourceObservationBuilder, SourcePerson,
};
pub use patient::{DestinationPatient, LinkOutcome, SourceIdentity};
pub use record::{DestinationRecord, Provenance, RecordData, RecordType, WriteOutcome};
pub use result::Result;

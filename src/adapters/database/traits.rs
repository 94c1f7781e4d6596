//! Destination store traits
//!
//! The destination is the application's patient-record store. The engine
//! needs four capabilities from it: find patients, write an identity link
//! once, insert a record at most once, and persist pipeline state.

use crate::core::state::SyncState;
use crate::domain::{
    DestinationPatient, DestinationRecord, LinkOutcome, PatientId, Result, SourcePersonId,
    WriteOutcome,
};
use async_trait::async_trait;

/// Patient and clinical-record access
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Test the destination connection
    async fn test_connection(&self) -> Result<()>;

    /// Create tables and indexes the engine relies on, if missing
    async fn ensure_schema(&self) -> Result<()>;

    /// Patient already linked to `person`, if any
    async fn find_linked_patient(&self, person: &SourcePersonId) -> Result<Option<PatientId>>;

    /// Patients whose normalized display name equals `normalized_name`
    ///
    /// `normalized_name` is the output of
    /// [`crate::core::identity::normalize_name`].
    async fn find_patients_by_normalized_name(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DestinationPatient>>;

    /// Writes the identity link on `patient_id` unless one already exists.
    ///
    /// A second write for the same person is a no-op that reports the
    /// existing link.
    async fn link_source_identity(
        &self,
        patient_id: &PatientId,
        person: &SourcePersonId,
    ) -> Result<LinkOutcome>;

    /// Inserts `record` unless a record with the same
    /// `(patient_id, provenance.source_system, provenance.source_id)` exists.
    async fn insert_record(&self, record: &DestinationRecord) -> Result<WriteOutcome>;

    /// Number of records, optionally for one patient
    async fn count_records(&self, patient_id: Option<&PatientId>) -> Result<u64>;

    /// Human-readable name of the store for logs
    fn describe(&self) -> String;
}

/// Pipeline state persistence
#[async_trait]
pub trait StateStorage: Send + Sync {
    async fn load_state(&self, pipeline_id: &str) -> Result<Option<SyncState>>;

    /// Upserts the state keyed by `state.id`
    async fn save_state(&self, state: &SyncState) -> Result<()>;
}

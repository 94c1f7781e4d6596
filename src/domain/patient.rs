//! Destination patient domain model

use super::ids::{PatientId, SourcePersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remembered link between a destination patient and a source person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub source_person_id: SourcePersonId,
    pub linked_at: DateTime<Utc>,
}

/// A patient known to the application
///
/// The application owns patients. The engine only reads them and writes
/// `source_identity` once, on the first successful match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationPatient {
    pub id: PatientId,
    pub display_name: String,
    pub source_identity: Option<SourceIdentity>,
}

impl DestinationPatient {
    pub fn new(id: PatientId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            source_identity: None,
        }
    }

    /// Returns true if this patient is linked to a source person other than `person`
    pub fn is_linked_elsewhere(&self, person: &SourcePersonId) -> bool {
        self.source_identity
            .as_ref()
            .is_some_and(|identity| &identity.source_person_id != person)
    }
}

/// Result of writing an identity link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link was written now
    Linked,
    /// The source person was already linked, possibly to another patient.
    /// The existing link stands.
    AlreadyLinked(PatientId),
    /// The patient is already linked to a different source person
    PatientLinkedElsewhere(SourcePersonId),
}

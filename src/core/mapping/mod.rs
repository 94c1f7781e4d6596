//! Record mapping
//!
//! Turns a [`SourceObservation`] into the [`DestinationRecord`] written for a
//! resolved patient. Mapping is pure: same inputs, same record.

pub mod categorize;

pub use categorize::ConceptCategorizer;

use crate::domain::{
    DestinationRecord, PatientId, Provenance, RecordData, RecordId, SourceObservation,
};
use chrono::{DateTime, Utc};

/// Maps observations to destination records
#[derive(Debug, Clone)]
pub struct RecordMapper {
    categorizer: ConceptCategorizer,
    source_system: String,
}

impl RecordMapper {
    pub fn new(categorizer: ConceptCategorizer, source_system: impl Into<String>) -> Self {
        Self {
            categorizer,
            source_system: source_system.into(),
        }
    }

    /// Builds the record for `observation` under `patient_id`.
    ///
    /// `synced_at` becomes the record's `created_at`.
    pub fn map(
        &self,
        observation: &SourceObservation,
        patient_id: &PatientId,
        synced_at: DateTime<Utc>,
    ) -> DestinationRecord {
        let concept_name = observation.concept_name.trim().to_string();

        DestinationRecord {
            id: RecordId::derive(patient_id, &self.source_system, &observation.source_id),
            patient_id: patient_id.clone(),
            record_type: self.categorizer.categorize(&concept_name),
            data: RecordData {
                label: concept_name,
                value: observation.value.as_ref().map(ToString::to_string),
                value_kind: observation.value.as_ref().map(|v| v.kind().to_string()),
                observed_at: observation.observed_at,
                provider: non_blank(observation.provider_name.as_deref()),
                location: non_blank(observation.location_name.as_deref()),
                notes: non_blank(observation.comments.as_deref()),
            },
            provenance: Provenance {
                source_system: self.source_system.clone(),
                source_id: observation.source_id.clone(),
                source_person_id: observation.person.id.clone(),
                encounter_id: observation.encounter_id.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            created_at: synced_at,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

//! Destination clinical record domain model

use super::ids::{PatientId, RecordId, SourceObservationId, SourcePersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a clinical record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Condition,
    Medication,
    VitalSign,
    LabResult,
    /// Visits, encounters and admissions
    Visit,
    /// Generic type for concepts that fit no category
    Observation,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Condition => "condition",
            RecordType::Medication => "medication",
            RecordType::VitalSign => "vital_sign",
            RecordType::LabResult => "lab_result",
            RecordType::Visit => "visit",
            RecordType::Observation => "observation",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "condition" => Ok(RecordType::Condition),
            "medication" => Ok(RecordType::Medication),
            "vital_sign" => Ok(RecordType::VitalSign),
            "lab_result" => Ok(RecordType::LabResult),
            "visit" => Ok(RecordType::Visit),
            "observation" => Ok(RecordType::Observation),
            _ => Err(format!("Unknown record type: {s}")),
        }
    }
}

/// Structured payload of a clinical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub label: String,
    pub value: Option<String>,
    pub value_kind: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub provider: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_system: String,
    pub source_id: SourceObservationId,
    pub source_person_id: SourcePersonId,
    pub encounter_id: Option<String>,
    pub engine_version: String,
}

/// A clinical-record entry in the destination store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub id: RecordId,
    pub patient_id: PatientId,
    pub record_type: RecordType,
    pub data: RecordData,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

/// Result of a conditional record insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    AlreadyPresent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_deterministic() {
        let patient = PatientId::new("P7").unwrap();
        let source = SourceObservationId::new("5268").unwrap();

        let first = RecordId::derive(&patient, "openmrs", &source);
        let second = RecordId::derive(&patient, "openmrs", &source);
        assert_eq!(first, second);

        let other = RecordId::derive(&PatientId::new("P8").unwrap(), "openmrs", &source);
        assert_ne!(first, other);

        // Same obs id from a second hospital is a different record
        let other_hospital = RecordId::derive(&patient, "openmrs-district", &source);
        assert_ne!(first, other_hospital);
    }

    #[test]
    fn test_record_type_round_trips_through_str() {
        for record_type in [
            RecordType::Condition,
            RecordType::Medication,
            RecordType::VitalSign,
            RecordType::LabResult,
            RecordType::Visit,
            RecordType::Observation,
        ] {
            assert_eq!(record_type.as_str().parse::<RecordType>(), Ok(record_type));
        }
        assert!("allergy".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_record_type_serde_matches_as_str() {
        let json = serde_json::to_string(&RecordType::VitalSign).unwrap();
        assert_eq!(json, "\"vital_sign\"");
    }
}

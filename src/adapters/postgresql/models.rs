//! Row models for the destination tables

use crate::domain::{
    DestinationError, DestinationPatient, DestinationRecord, EngineError, PatientId, Result,
    SourceIdentity, SourcePersonId,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;

/// Row of the `patients` table
#[derive(Debug, Clone)]
pub struct PatientRow {
    pub id: String,
    pub display_name: String,
    pub source_person_id: Option<String>,
    pub source_linked_at: Option<DateTime<Utc>>,
}

impl PatientRow {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: try_get(row, "id")?,
            display_name: try_get(row, "display_name")?,
            source_person_id: try_get(row, "source_person_id")?,
            source_linked_at: try_get(row, "source_linked_at")?,
        })
    }

    pub fn to_domain(self) -> Result<DestinationPatient> {
        let id = PatientId::new(self.id).map_err(invalid_row)?;
        let source_identity = match self.source_person_id {
            Some(person) => Some(SourceIdentity {
                source_person_id: SourcePersonId::new(person).map_err(invalid_row)?,
                linked_at: self.source_linked_at.unwrap_or_else(Utc::now),
            }),
            None => None,
        };

        Ok(DestinationPatient {
            id,
            display_name: self.display_name,
            source_identity,
        })
    }
}

/// Row of the `clinical_records` table
#[derive(Debug, Clone)]
pub struct ClinicalRecordRow {
    pub id: String,
    pub patient_id: String,
    pub record_type: String,
    pub data: Value,
    pub provenance: Value,
    pub source_system: String,
    pub source_id: String,
    pub created_at: DateTime<Utc>,
}

impl ClinicalRecordRow {
    pub fn from_domain(record: &DestinationRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.to_string(),
            patient_id: record.patient_id.to_string(),
            record_type: record.record_type.as_str().to_string(),
            data: serde_json::to_value(&record.data)?,
            provenance: serde_json::to_value(&record.provenance)?,
            source_system: record.provenance.source_system.clone(),
            source_id: record.provenance.source_id.to_string(),
            created_at: record.created_at,
        })
    }
}

fn try_get<'a, T>(row: &'a Row, column: &str) -> Result<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column).map_err(|e| {
        DestinationError::QueryFailed(format!("Failed to read column '{column}': {e}")).into()
    })
}

fn invalid_row(message: String) -> EngineError {
    DestinationError::QueryFailed(format!("Invalid patient row: {message}")).into()
}

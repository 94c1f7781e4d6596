//! Idempotent record writes

use crate::adapters::database::traits::RecordStore;
use crate::domain::{DestinationRecord, Result, WriteOutcome};
use std::sync::Arc;

/// Writes mapped records at most once per `(patient, source observation)`
pub struct RecordWriter {
    store: Arc<dyn RecordStore>,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Inserts `record` unless an equivalent one exists.
    ///
    /// Writing the same record again reports [`WriteOutcome::AlreadyPresent`]
    /// and changes nothing.
    pub async fn write(&self, record: &DestinationRecord) -> Result<WriteOutcome> {
        let outcome = self.store.insert_record(record).await?;

        match outcome {
            WriteOutcome::Inserted => tracing::debug!(
                patient_id = %record.patient_id,
                source_id = %record.provenance.source_id,
                record_type = %record.record_type,
                "Inserted clinical record"
            ),
            WriteOutcome::AlreadyPresent => tracing::debug!(
                patient_id = %record.patient_id,
                source_id = %record.provenance.source_id,
                "Clinical record already present"
            ),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRecordStore;
    use crate::core::mapping::{ConceptCategorizer, RecordMapper};
    use crate::domain::{
        ObservationValue, PatientId, SourceObservation, SourceObservationId, SourcePerson,
        SourcePersonId,
    };
    use chrono::Utc;

    fn record(synced_at: chrono::DateTime<Utc>) -> DestinationRecord {
        let observation = SourceObservation::builder()
            .source_id(SourceObservationId::new("5268").unwrap())
            .person(SourcePerson::new(SourcePersonId::new("102").unwrap(), "Betty", "Williams"))
            .concept_name("Malaria smear")
            .value(Some(ObservationValue::Coded("Positive".to_string())))
            .observed_at(Utc::now())
            .build()
            .unwrap();
        RecordMapper::new(ConceptCategorizer::builtin().unwrap(), "openmrs").map(
            &observation,
            &PatientId::new("P7").unwrap(),
            synced_at,
        )
    }

    #[tokio::test]
    async fn test_rewrite_is_noop() {
        let store = Arc::new(MemoryRecordStore::new());
        let writer = RecordWriter::new(store.clone());

        let first = writer.write(&record(Utc::now())).await.unwrap();
        // A later run maps the same observation with a new sync time.
        let second = writer.write(&record(Utc::now())).await.unwrap();

        assert_eq!(first, WriteOutcome::Inserted);
        assert_eq!(second, WriteOutcome::AlreadyPresent);
        assert_eq!(store.records().await.len(), 1);
    }
}

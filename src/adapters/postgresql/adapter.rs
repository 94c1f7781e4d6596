//! PostgreSQL destination store
//!
//! Implements [`RecordStore`] and [`StateStorage`] over the `patients`,
//! `clinical_records` and `sync_state` tables.

use crate::adapters::database::traits::{RecordStore, StateStorage};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{ClinicalRecordRow, PatientRow};
use crate::core::identity::normalize_name;
use crate::core::state::SyncState;
use crate::domain::{
    DestinationError, DestinationPatient, DestinationRecord, EngineError, LinkOutcome, PatientId,
    Result, SourcePersonId, WriteOutcome,
};
use async_trait::async_trait;
use std::sync::Arc;

const SCHEMA_SQL: &str = include_str!("../../../migrations/001_initial_schema.sql");

/// ASCII letters and digits of `display_name`, lower-cased, in SQL.
///
/// `translate` and an explicit character list keep this independent of the
/// database collation and ctype. The two non-ASCII letters whose Unicode
/// lowercase is an ASCII letter are folded as well. Candidates are re-checked
/// with [`normalize_name`], so this only has to be looser than it.
const NAME_KEY_SQL: &str = "regexp_replace(translate(display_name, \
     'ABCDEFGHIJKLMNOPQRSTUVWXYZ\u{212A}\u{130}', 'abcdefghijklmnopqrstuvwxyzki'), \
     '[^abcdefghijklmnopqrstuvwxyz0123456789]', '', 'g')";

/// Rust side of [`NAME_KEY_SQL`] for an already normalized name
fn name_key(normalized_name: &str) -> String {
    normalized_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Treats a unique violation on the link update as zero rows written.
///
/// Two workers can pass the `NOT EXISTS` guard for the same person at once;
/// the partial unique index then rejects the second update.
fn rows_linked(result: Result<u64>) -> Result<u64> {
    match result {
        Err(EngineError::DestinationUnavailable(DestinationError::UniqueViolation(e))) => {
            tracing::debug!(error = %e, "Identity link lost a concurrent race");
            Ok(0)
        }
        other => other,
    }
}

/// PostgreSQL implementation of the destination traits
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    async fn load_patient(&self, patient_id: &PatientId) -> Result<Option<DestinationPatient>> {
        let rows = self
            .client
            .query(
                "SELECT id, display_name, source_person_id, source_linked_at \
                 FROM patients WHERE id = $1",
                &[&patient_id.as_str()],
            )
            .await?;

        rows.first()
            .map(|row| PatientRow::from_row(row)?.to_domain())
            .transpose()
    }
}

#[async_trait]
impl RecordStore for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.batch_execute(SCHEMA_SQL).await.map_err(|e| {
            EngineError::DestinationUnavailable(DestinationError::SchemaFailed(e.to_string()))
        })?;
        tracing::info!("Destination schema initialized");
        Ok(())
    }

    async fn find_linked_patient(&self, person: &SourcePersonId) -> Result<Option<PatientId>> {
        let rows = self
            .client
            .query(
                "SELECT id FROM patients WHERE source_person_id = $1",
                &[&person.as_str()],
            )
            .await?;

        match rows.first() {
            Some(row) => {
                let id: String = row.try_get("id").map_err(|e| {
                    DestinationError::QueryFailed(format!("Failed to read patient id: {e}"))
                })?;
                let id = PatientId::new(id).map_err(DestinationError::QueryFailed)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn find_patients_by_normalized_name(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DestinationPatient>> {
        let query = format!(
            "SELECT id, display_name, source_person_id, source_linked_at \
             FROM patients WHERE {NAME_KEY_SQL} = $1 ORDER BY id"
        );
        let rows = self
            .client
            .query(&query, &[&name_key(normalized_name)])
            .await?;

        let mut patients = Vec::with_capacity(rows.len());
        for row in &rows {
            let patient = PatientRow::from_row(row)?.to_domain()?;
            if normalize_name(&patient.display_name) == normalized_name {
                patients.push(patient);
            }
        }

        tracing::debug!(
            candidates = patients.len(),
            "Loaded name-match candidates from destination"
        );
        Ok(patients)
    }

    async fn link_source_identity(
        &self,
        patient_id: &PatientId,
        person: &SourcePersonId,
    ) -> Result<LinkOutcome> {
        let updated = self
            .client
            .execute(
                "UPDATE patients \
                 SET source_person_id = $2, source_linked_at = NOW() \
                 WHERE id = $1 AND source_person_id IS NULL \
                 AND NOT EXISTS (SELECT 1 FROM patients WHERE source_person_id = $2)",
                &[&patient_id.as_str(), &person.as_str()],
            )
            .await;
        let updated = rows_linked(updated)?;

        if updated == 1 {
            tracing::info!(
                patient_id = %patient_id,
                source_person_id = %person,
                "Linked destination patient to source person"
            );
            return Ok(LinkOutcome::Linked);
        }

        // Nothing written: find out which condition held.
        if let Some(existing) = self.find_linked_patient(person).await? {
            return Ok(LinkOutcome::AlreadyLinked(existing));
        }

        match self.load_patient(patient_id).await? {
            Some(patient) => match patient.source_identity {
                Some(identity) => Ok(LinkOutcome::PatientLinkedElsewhere(
                    identity.source_person_id,
                )),
                None => Err(DestinationError::LinkFailed(format!(
                    "link for patient {patient_id} was not written"
                ))
                .into()),
            },
            None => Err(
                DestinationError::LinkFailed(format!("patient {patient_id} not found")).into(),
            ),
        }
    }

    async fn insert_record(&self, record: &DestinationRecord) -> Result<WriteOutcome> {
        let row = ClinicalRecordRow::from_domain(record)?;

        let inserted = self
            .client
            .execute(
                "INSERT INTO clinical_records \
                 (id, patient_id, record_type, data, provenance, source_system, source_id, \
                 created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT DO NOTHING",
                &[
                    &row.id,
                    &row.patient_id,
                    &row.record_type,
                    &row.data,
                    &row.provenance,
                    &row.source_system,
                    &row.source_id,
                    &row.created_at,
                ],
            )
            .await
            .map_err(|e| match e {
                EngineError::DestinationUnavailable(DestinationError::QueryFailed(message)) => {
                    DestinationError::InsertFailed(message).into()
                }
                other => other,
            })?;

        if inserted == 0 {
            Ok(WriteOutcome::AlreadyPresent)
        } else {
            Ok(WriteOutcome::Inserted)
        }
    }

    async fn count_records(&self, patient_id: Option<&PatientId>) -> Result<u64> {
        let rows = match patient_id {
            Some(id) => {
                self.client
                    .query(
                        "SELECT COUNT(*) FROM clinical_records WHERE patient_id = $1",
                        &[&id.as_str()],
                    )
                    .await?
            }
            None => {
                self.client
                    .query("SELECT COUNT(*) FROM clinical_records", &[])
                    .await?
            }
        };

        let count: i64 = rows
            .first()
            .map(|row| row.try_get(0))
            .transpose()
            .map_err(|e| DestinationError::QueryFailed(format!("Failed to read count: {e}")))?
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    fn describe(&self) -> String {
        format!("postgresql ({})", self.client.connection_string_safe())
    }
}

#[async_trait]
impl StateStorage for PostgreSQLAdapter {
    async fn load_state(&self, pipeline_id: &str) -> Result<Option<SyncState>> {
        tracing::debug!(pipeline_id = %pipeline_id, "Loading sync state from PostgreSQL");

        let rows = self
            .client
            .query("SELECT state FROM sync_state WHERE id = $1", &[&pipeline_id])
            .await?;

        let Some(row) = rows.first() else {
            tracing::debug!(pipeline_id = %pipeline_id, "No sync state found (first run)");
            return Ok(None);
        };

        let value: serde_json::Value = row
            .try_get("state")
            .map_err(|e| EngineError::State(format!("Failed to read sync state: {e}")))?;
        let state = serde_json::from_value(value)
            .map_err(|e| EngineError::State(format!("Corrupt sync state: {e}")))?;
        Ok(Some(state))
    }

    async fn save_state(&self, state: &SyncState) -> Result<()> {
        let value = serde_json::to_value(state)?;

        self.client
            .execute(
                "INSERT INTO sync_state (id, state, updated_at) VALUES ($1, $2, NOW()) \
                 ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, updated_at = NOW()",
                &[&state.id, &value],
            )
            .await?;

        tracing::debug!(
            pipeline_id = %state.id,
            status = %state.last_run_status,
            "Sync state saved to PostgreSQL"
        );
        Ok(())
    }
}

//! In-process source and destination
//!
//! Used by the test suites and for local dry runs. Both sides can be switched
//! to "unavailable" to exercise outage handling.

use crate::adapters::database::traits::{RecordStore, StateStorage};
use crate::adapters::source::{paged, ObservationSource, ObservationStream, SourceConnector};
use crate::core::identity::normalize_name;
use crate::core::state::SyncState;
use crate::domain::{
    DestinationError, DestinationPatient, DestinationRecord, LinkOutcome, PatientId, Result,
    SourceCursor, SourceError, SourceIdentity, SourceObservation, SourceObservationId,
    SourcePersonId, WriteOutcome,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct SourceInner {
    observations: RwLock<Vec<SourceObservation>>,
    unavailable: AtomicBool,
    /// Fail page fetches once this many observations were handed out
    fail_after: AtomicUsize,
    page_delay_ms: AtomicU64,
    connects: AtomicUsize,
}

/// Observation source backed by a vector
///
/// Clones share the same data. Observations are kept sorted by
/// `(recorded_at, source_id)`, numeric ids by value.
#[derive(Clone)]
pub struct MemorySource {
    inner: Arc<SourceInner>,
}

struct MemoryPage {
    after: Option<SourceCursor>,
    handed_out: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        let inner = SourceInner {
            fail_after: AtomicUsize::new(usize::MAX),
            ..Default::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub async fn push(&self, observation: SourceObservation) {
        let mut observations = self.inner.observations.write().await;
        observations.push(observation);
        observations.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.source_id.ingestion_cmp(&b.source_id))
        });
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes page fetches fail once `count` observations were handed out
    /// by a stream. `None` clears it.
    pub fn fail_after(&self, count: Option<usize>) {
        self.inner
            .fail_after
            .store(count.unwrap_or(usize::MAX), Ordering::SeqCst);
    }

    /// Delays every page fetch
    pub fn set_page_delay(&self, delay: Duration) {
        self.inner
            .page_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of times [`SourceConnector::connect`] succeeded
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(
                SourceError::ConnectionFailed("memory source is offline".to_string()).into(),
            );
        }
        Ok(())
    }

    async fn fetch_page(
        &self,
        state: MemoryPage,
        page_size: usize,
    ) -> Result<Option<(Vec<Result<SourceObservation>>, MemoryPage)>> {
        let delay = self.inner.page_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.check_available()?;
        if state.handed_out >= self.inner.fail_after.load(Ordering::SeqCst) {
            return Err(SourceError::ConnectionFailed("connection lost mid-run".to_string()).into());
        }

        let page: Vec<SourceObservation> = {
            let observations = self.inner.observations.read().await;
            observations
                .iter()
                .filter(|o| o.is_after(state.after.as_ref()))
                .take(page_size)
                .cloned()
                .collect()
        };

        if page.is_empty() {
            return Ok(None);
        }

        let next = MemoryPage {
            after: page.last().map(SourceObservation::cursor),
            handed_out: state.handed_out + page.len(),
        };
        Ok(Some((page.into_iter().map(Ok).collect(), next)))
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationSource for MemorySource {
    async fn test_connection(&self) -> Result<()> {
        self.check_available()
    }

    fn observations(
        &self,
        since: Option<SourceCursor>,
        page_size: usize,
    ) -> ObservationStream<'_> {
        let start = MemoryPage {
            after: since,
            handed_out: 0,
        };
        paged(start, move |state| self.fetch_page(state, page_size))
    }

    fn describe(&self) -> String {
        "memory source".to_string()
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    async fn connect(&self) -> Result<Arc<dyn ObservationSource>> {
        self.check_available()?;
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[derive(Default)]
struct StoreState {
    patients: BTreeMap<PatientId, DestinationPatient>,
    records: BTreeMap<(PatientId, String, SourceObservationId), DestinationRecord>,
    sync_states: HashMap<String, SyncState>,
}

/// Destination store held in memory
#[derive(Default)]
pub struct MemoryRecordStore {
    state: RwLock<StoreState>,
    unavailable: AtomicBool,
    schema_applied: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, patient: DestinationPatient) {
        self.state
            .write()
            .await
            .patients
            .insert(patient.id.clone(), patient);
    }

    pub async fn patient(&self, id: &PatientId) -> Option<DestinationPatient> {
        self.state.read().await.patients.get(id).cloned()
    }

    /// All records, ordered by patient, source system then source id
    pub async fn records(&self) -> Vec<DestinationRecord> {
        self.state.read().await.records.values().cloned().collect()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of times [`RecordStore::ensure_schema`] succeeded
    pub fn schema_applications(&self) -> usize {
        self.schema_applied.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(
                DestinationError::ConnectionFailed("memory store is offline".to_string()).into(),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn test_connection(&self) -> Result<()> {
        self.check_available()
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.check_available()?;
        self.schema_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_linked_patient(&self, person: &SourcePersonId) -> Result<Option<PatientId>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .patients
            .values()
            .find(|p| {
                p.source_identity
                    .as_ref()
                    .is_some_and(|identity| &identity.source_person_id == person)
            })
            .map(|p| p.id.clone()))
    }

    async fn find_patients_by_normalized_name(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DestinationPatient>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .patients
            .values()
            .filter(|p| normalize_name(&p.display_name) == normalized_name)
            .cloned()
            .collect())
    }

    async fn link_source_identity(
        &self,
        patient_id: &PatientId,
        person: &SourcePersonId,
    ) -> Result<LinkOutcome> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let existing = state.patients.values().find(|p| {
            p.source_identity
                .as_ref()
                .is_some_and(|identity| &identity.source_person_id == person)
        });
        if let Some(existing) = existing {
            return Ok(LinkOutcome::AlreadyLinked(existing.id.clone()));
        }

        let patient = state.patients.get_mut(patient_id).ok_or_else(|| {
            DestinationError::LinkFailed(format!("patient {patient_id} not found"))
        })?;

        if let Some(identity) = &patient.source_identity {
            return Ok(LinkOutcome::PatientLinkedElsewhere(
                identity.source_person_id.clone(),
            ));
        }

        patient.source_identity = Some(SourceIdentity {
            source_person_id: person.clone(),
            linked_at: Utc::now(),
        });
        Ok(LinkOutcome::Linked)
    }

    async fn insert_record(&self, record: &DestinationRecord) -> Result<WriteOutcome> {
        self.check_available()?;
        let key = (
            record.patient_id.clone(),
            record.provenance.source_system.clone(),
            record.provenance.source_id.clone(),
        );
        let mut state = self.state.write().await;
        if state.records.contains_key(&key) {
            return Ok(WriteOutcome::AlreadyPresent);
        }
        state.records.insert(key, record.clone());
        Ok(WriteOutcome::Inserted)
    }

    async fn count_records(&self, patient_id: Option<&PatientId>) -> Result<u64> {
        self.check_available()?;
        let state = self.state.read().await;
        let count = match patient_id {
            Some(id) => state.records.keys().filter(|(p, _, _)| p == id).count(),
            None => state.records.len(),
        };
        Ok(count as u64)
    }

    fn describe(&self) -> String {
        "memory store".to_string()
    }
}

#[async_trait]
impl StateStorage for MemoryRecordStore {
    async fn load_state(&self, pipeline_id: &str) -> Result<Option<SyncState>> {
        self.check_available()?;
        Ok(self.state.read().await.sync_states.get(pipeline_id).cloned())
    }

    async fn save_state(&self, sync_state: &SyncState) -> Result<()> {
        self.check_available()?;
        self.state
            .write()
            .await
            .sync_states
            .insert(sync_state.id.clone(), sync_state.clone());
        Ok(())
    }
}

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use passport_sync::adapters::memory::{MemoryRecordStore, MemorySource};
use passport_sync::core::mapping::{ConceptCategorizer, RecordMapper};
use passport_sync::core::sync::{SyncEngine, SyncOptions};
use passport_sync::domain::{
    DestinationPatient, ObservationValue, PatientId, SourceObservation, SourceObservationId,
    SourcePerson, SourcePersonId,
};
use std::sync::Arc;

pub const PIPELINE: &str = "test_pipeline";

/// In-memory source and destination wired into engines
pub struct Harness {
    pub source: MemorySource,
    pub store: Arc<MemoryRecordStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            source: MemorySource::new(),
            store: Arc::new(MemoryRecordStore::new()),
        }
    }

    pub fn options(dry_run: bool) -> SyncOptions {
        SyncOptions {
            pipeline_id: PIPELINE.to_string(),
            page_size: 2,
            dry_run,
            initial_lookback: None,
        }
    }

    pub fn engine(&self) -> SyncEngine {
        self.engine_with(Self::options(false))
    }

    pub fn dry_run_engine(&self) -> SyncEngine {
        self.engine_with(Self::options(true))
    }

    pub fn engine_with(&self, options: SyncOptions) -> SyncEngine {
        SyncEngine::new(
            Arc::new(self.source.clone()),
            self.store.clone(),
            self.store.clone(),
            mapper(),
            options,
        )
    }

    /// Engine over a different source but this harness's destination
    pub fn engine_for_source(&self, source: MemorySource) -> SyncEngine {
        SyncEngine::new(
            Arc::new(source),
            self.store.clone(),
            self.store.clone(),
            mapper(),
            Self::options(false),
        )
    }

    /// Engine for a second hospital: its own source, system name and pipeline
    pub fn engine_for_system(&self, source: MemorySource, system: &str) -> SyncEngine {
        SyncEngine::new(
            Arc::new(source),
            self.store.clone(),
            self.store.clone(),
            RecordMapper::new(ConceptCategorizer::builtin().unwrap(), system),
            SyncOptions {
                pipeline_id: format!("{system}_observations"),
                ..Self::options(false)
            },
        )
    }

    pub async fn add_patient(&self, id: &str, name: &str) {
        self.store
            .add_patient(DestinationPatient::new(PatientId::new(id).unwrap(), name))
            .await;
    }
}

pub fn mapper() -> RecordMapper {
    RecordMapper::new(ConceptCategorizer::builtin().unwrap(), "openmrs")
}

/// A fixed point in March 2024, `day` days and `hour` hours in
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

pub fn betty() -> SourcePerson {
    person("102", "Betty", "Williams")
}

pub fn person(id: &str, given: &str, family: &str) -> SourcePerson {
    SourcePerson::new(SourcePersonId::new(id).unwrap(), given, family)
}

/// A person whose name matches none of the fixture patients
pub fn stranger(id: &str) -> SourcePerson {
    loop {
        let given: String = FirstName().fake();
        let family: String = LastName().fake();
        if family != "Williams" && family != "Smith" {
            return person(id, &given, &family);
        }
    }
}

pub fn observation(
    id: &str,
    person: SourcePerson,
    concept: &str,
    recorded_at: DateTime<Utc>,
) -> SourceObservation {
    SourceObservation::builder()
        .source_id(SourceObservationId::new(id).unwrap())
        .person(person)
        .concept_name(concept)
        .value(Some(ObservationValue::Text("recorded".to_string())))
        .observed_at(recorded_at)
        .recorded_at(recorded_at)
        .build()
        .unwrap()
}

/// Betty's three observations across one week
pub async fn seed_week_of_observations(source: &MemorySource) {
    source
        .push(observation("5268", betty(), "Blood Pressure", at(1, 9)))
        .await;
    source
        .push(observation("5269", betty(), "Diagnosis: Malaria", at(4, 11)))
        .await;
    source
        .push(observation("5270", betty(), "Weight", at(7, 15)))
        .await;
}

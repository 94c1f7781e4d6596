//! Integration tests for the sync engine
//!
//! Exercise whole runs against the in-memory source and destination:
//! idempotent writes, identity links, checkpoint movement and outages.

mod common;

use common::{at, betty, minutes_ago, observation, person, stranger, Harness, PIPELINE};
use passport_sync::adapters::database::RecordStore;
use passport_sync::adapters::memory::MemorySource;
use passport_sync::core::state::RunStatus;
use passport_sync::core::sync::{IssueKind, SyncMode};
use passport_sync::domain::{PatientId, RecordType, SourceCursor};
use std::collections::HashSet;

fn p7() -> PatientId {
    PatientId::new("P7").unwrap()
}

#[tokio::test]
async fn test_full_sync_creates_one_record_per_observation() {
    let harness = Harness::new();
    common::seed_week_of_observations(&harness.source).await;
    harness.add_patient("P7", "Betty Williams").await;

    let summary = harness.engine().execute(SyncMode::FullHistory).await;

    assert!(summary.is_successful(), "run failed: {:?}", summary.error);
    assert_eq!(summary.observations_read, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.skipped_no_match, 0);

    let records = harness.store.records().await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.patient_id == p7()));

    let source_ids: HashSet<_> = records
        .iter()
        .map(|r| r.provenance.source_id.as_str().to_string())
        .collect();
    assert_eq!(source_ids.len(), 3);

    let type_of = |label: &str| {
        records
            .iter()
            .find(|r| r.data.label == label)
            .map(|r| r.record_type)
    };
    assert_eq!(type_of("Blood Pressure"), Some(RecordType::VitalSign));
    assert_eq!(type_of("Diagnosis: Malaria"), Some(RecordType::Condition));
    assert_eq!(type_of("Weight"), Some(RecordType::VitalSign));

    let patient = harness.store.patient(&p7()).await.unwrap();
    let identity = patient.source_identity.unwrap();
    assert_eq!(identity.source_person_id.as_str(), "102");
}

#[tokio::test]
async fn test_checkpoint_moves_to_last_observation() {
    let harness = Harness::new();
    common::seed_week_of_observations(&harness.source).await;
    harness.add_patient("P7", "Betty Williams").await;

    let engine = harness.engine();
    let summary = engine.execute(SyncMode::Incremental).await;
    assert!(summary.is_successful());

    let state = engine.load_state().await.unwrap().unwrap();
    let checkpoint = state.checkpoint.unwrap();
    assert_eq!(checkpoint.recorded_at, at(7, 15));
    assert_eq!(checkpoint.source_id.as_str(), "5270");
    assert_eq!(state.last_run_status, RunStatus::Succeeded);
    assert_eq!(state.records_inserted_total, 3);
    assert_eq!(state.id, PIPELINE);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let harness = Harness::new();
    common::seed_week_of_observations(&harness.source).await;
    harness.add_patient("P7", "Betty Williams").await;
    let engine = harness.engine();

    let first = engine.execute(SyncMode::Incremental).await;
    assert_eq!(first.inserted, 3);

    // Nothing new after the checkpoint
    let second = engine.execute(SyncMode::Incremental).await;
    assert!(second.is_successful());
    assert_eq!(second.observations_read, 0);
    assert_eq!(second.inserted, 0);

    // Replaying everything finds every record already written
    let replay = engine.execute(SyncMode::FullHistory).await;
    assert!(replay.is_successful());
    assert_eq!(replay.observations_read, 3);
    assert_eq!(replay.inserted, 0);
    assert_eq!(replay.already_present, 3);

    assert_eq!(harness.store.count_records(Some(&p7())).await.unwrap(), 3);
}

#[tokio::test]
async fn test_new_observations_picked_up_incrementally() {
    let harness = Harness::new();
    common::seed_week_of_observations(&harness.source).await;
    harness.add_patient("P7", "Betty Williams").await;
    let engine = harness.engine();

    engine.execute(SyncMode::Incremental).await;
    harness
        .source
        .push(observation("5301", betty(), "Temperature", at(9, 8)))
        .await;

    let summary = engine.execute(SyncMode::Incremental).await;
    assert_eq!(summary.observations_read, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(harness.store.records().await.len(), 4);
}

#[tokio::test]
async fn test_identity_link_survives_name_change() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    harness
        .source
        .push(observation("5268", betty(), "Weight", at(1, 9)))
        .await;

    let engine = harness.engine();
    engine.execute(SyncMode::Incremental).await;

    // Person 102 is renamed in the EMR; another patient now carries the new name
    harness.add_patient("P9", "Betty Smith").await;
    harness
        .source
        .push(observation(
            "5400",
            person("102", "Betty", "Smith"),
            "Weight",
            at(2, 9),
        ))
        .await;

    let summary = engine.execute(SyncMode::Incremental).await;
    assert_eq!(summary.inserted, 1);

    let records = harness.store.records().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.patient_id == p7()));

    let p9 = harness
        .store
        .patient(&PatientId::new("P9").unwrap())
        .await
        .unwrap();
    assert!(p9.source_identity.is_none());
}

#[tokio::test]
async fn test_name_matching_ignores_case_and_spacing() {
    let harness = Harness::new();
    harness.add_patient("P7", "  betty   WILLIAMS ").await;
    harness
        .source
        .push(observation("5268", betty(), "Weight", at(1, 9)))
        .await;

    let summary = harness.engine().execute(SyncMode::Incremental).await;
    assert_eq!(summary.inserted, 1);
    assert_eq!(harness.store.records().await[0].patient_id, p7());
}

#[tokio::test]
async fn test_no_match_skips_and_advances_checkpoint() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    let unknown = observation("6001", stranger("555"), "Weight", at(3, 10));
    harness.source.push(unknown.clone()).await;

    let engine = harness.engine();
    let summary = engine.execute(SyncMode::Incremental).await;

    assert!(summary.is_successful());
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.skipped_no_match, 1);
    assert_eq!(summary.issues.len(), 1);
    assert_eq!(summary.issues[0].kind, IssueKind::NoMatch);
    assert!(harness.store.records().await.is_empty());

    let state = engine.load_state().await.unwrap().unwrap();
    assert_eq!(state.checkpoint, Some(unknown.cursor()));
}

#[tokio::test]
async fn test_ambiguous_name_is_not_guessed() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    harness.add_patient("P8", "betty williams").await;
    harness
        .source
        .push(observation("5268", betty(), "Weight", at(1, 9)))
        .await;

    let summary = harness.engine().execute(SyncMode::Incremental).await;

    assert!(summary.is_successful());
    assert_eq!(summary.skipped_no_match, 1);
    assert!(summary.issues[0].message.contains("2 patients share the name"));
    assert!(harness.store.records().await.is_empty());

    for id in ["P7", "P8"] {
        let patient = harness
            .store
            .patient(&PatientId::new(id).unwrap())
            .await
            .unwrap();
        assert!(patient.source_identity.is_none());
    }
}

#[tokio::test]
async fn test_invalid_observation_counted_and_skipped() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    harness
        .source
        .push(observation("5268", betty(), "   ", at(1, 9)))
        .await;
    harness
        .source
        .push(observation("5269", betty(), "Weight", at(2, 9)))
        .await;

    let engine = harness.engine();
    let summary = engine.execute(SyncMode::Incremental).await;

    assert!(summary.is_successful());
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.issues[0].kind, IssueKind::Invalid);

    let checkpoint = engine.load_state().await.unwrap().unwrap().checkpoint;
    assert_eq!(checkpoint.unwrap().source_id.as_str(), "5269");
}

#[tokio::test]
async fn test_source_outage_fails_run_and_keeps_checkpoint() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;
    harness.source.set_unavailable(true);

    let engine = harness.engine();
    let summary = engine.execute(SyncMode::Incremental).await;

    assert!(!summary.is_successful());
    assert!(summary.error.as_deref().unwrap().contains("Source unavailable"));

    let state = engine.load_state().await.unwrap().unwrap();
    assert_eq!(state.last_run_status, RunStatus::Failed);
    assert!(state.checkpoint.is_none());

    // Recovery on the next run
    harness.source.set_unavailable(false);
    let summary = engine.execute(SyncMode::Incremental).await;
    assert!(summary.is_successful());
    assert_eq!(summary.inserted, 3);
}

#[tokio::test]
async fn test_destination_outage_fails_run() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;
    harness.store.set_unavailable(true);

    let summary = harness.engine().execute(SyncMode::Incremental).await;

    assert!(!summary.is_successful());
    assert_eq!(summary.inserted, 0);

    harness.store.set_unavailable(false);
    assert!(harness.store.records().await.is_empty());
}

#[tokio::test]
async fn test_failed_run_replay_does_not_duplicate() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;

    // Page size is 2: the second page fetch fails after two inserts
    harness.source.fail_after(Some(2));
    let engine = harness.engine();
    let failed = engine.execute(SyncMode::Incremental).await;

    assert!(!failed.is_successful());
    assert_eq!(failed.inserted, 2);
    let state = engine.load_state().await.unwrap().unwrap();
    assert!(state.checkpoint.is_none());

    harness.source.fail_after(None);
    let retried = engine.execute(SyncMode::Incremental).await;

    assert!(retried.is_successful());
    assert_eq!(retried.already_present, 2);
    assert_eq!(retried.inserted, 1);
    assert_eq!(harness.store.records().await.len(), 3);
}

#[tokio::test]
async fn test_full_history_replay_never_moves_checkpoint_back() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;

    let engine = harness.engine();
    engine.execute(SyncMode::Incremental).await;

    // Same pipeline, but the source now only has the oldest observation
    let shrunk = MemorySource::new();
    shrunk
        .push(observation("5268", betty(), "Blood Pressure", at(1, 9)))
        .await;
    let replay = harness
        .engine_for_source(shrunk)
        .execute(SyncMode::FullHistory)
        .await;
    assert!(replay.is_successful());
    assert_eq!(replay.already_present, 1);

    let checkpoint = engine.load_state().await.unwrap().unwrap().checkpoint;
    assert_eq!(
        checkpoint.map(|c| c.source_id.as_str().to_string()),
        Some("5270".to_string())
    );
}

#[tokio::test]
async fn test_initial_lookback_limits_first_run() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    harness
        .source
        .push(observation("1", betty(), "Weight", at(1, 9)))
        .await;
    harness
        .source
        .push(observation("2", betty(), "Weight", minutes_ago(10)))
        .await;

    let mut options = Harness::options(false);
    options.initial_lookback = Some(chrono::Duration::hours(1));
    let summary = harness.engine_with(options).execute(SyncMode::Incremental).await;

    assert_eq!(summary.observations_read, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(
        harness.store.records().await[0].provenance.source_id.as_str(),
        "2"
    );
}

#[tokio::test]
async fn test_summary_persisted_with_state() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;

    let engine = harness.engine();
    let summary = engine.execute(SyncMode::Incremental).await;

    let state = engine.load_state().await.unwrap().unwrap();
    let last_run = state.last_run.unwrap();
    assert_eq!(last_run.run_id, summary.run_id);
    assert_eq!(last_run.inserted, 3);
    assert_eq!(
        last_run.checkpoint_after,
        Some(SourceCursor::new(
            at(7, 15),
            passport_sync::domain::SourceObservationId::new("5270").unwrap()
        ))
    );
}

#[tokio::test]
async fn test_destination_schema_applied_once_per_engine() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;

    let engine = harness.engine();
    engine.execute(SyncMode::Incremental).await;
    engine.execute(SyncMode::Incremental).await;

    assert_eq!(harness.store.schema_applications(), 1);
}

#[tokio::test]
async fn test_dry_run_does_not_apply_schema() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;

    let summary = harness.dry_run_engine().execute(SyncMode::Incremental).await;

    assert!(summary.is_successful());
    assert_eq!(harness.store.schema_applications(), 0);
}

#[tokio::test]
async fn test_unprepared_destination_fails_run_then_recovers() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;
    let engine = harness.engine();

    harness.store.set_unavailable(true);
    let summary = engine.execute(SyncMode::Incremental).await;
    assert!(!summary.is_successful());
    assert!(summary
        .error
        .as_deref()
        .unwrap()
        .contains("Failed to prepare destination"));
    assert_eq!(harness.source.connects(), 0);

    harness.store.set_unavailable(false);
    let summary = engine.execute(SyncMode::Incremental).await;
    assert!(summary.is_successful());
    assert_eq!(summary.inserted, 3);
    assert_eq!(harness.store.schema_applications(), 1);
}

#[tokio::test]
async fn test_connection_check_covers_both_ends() {
    let harness = Harness::new();
    let engine = harness.engine();
    assert!(engine.test_connections().await.is_ok());

    harness.source.set_unavailable(true);
    assert!(engine.test_connections().await.is_err());

    harness.source.set_unavailable(false);
    harness.store.set_unavailable(true);
    assert!(engine.test_connections().await.is_err());
}

#[tokio::test]
async fn test_person_without_name_is_counted_not_dropped() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    harness
        .source
        .push(observation("7001", person("555", "", ""), "Unknown Concept (5089)", at(2, 8)))
        .await;

    let engine = harness.engine();
    let summary = engine.execute(SyncMode::Incremental).await;

    assert!(summary.is_successful());
    assert_eq!(summary.observations_read, 1);
    assert_eq!(summary.skipped_no_match, 1);
    assert_eq!(summary.issues[0].kind, IssueKind::NoMatch);
    assert!(summary.issues[0].message.contains("no name"));

    let state = engine.load_state().await.unwrap().unwrap();
    assert_eq!(state.checkpoint.unwrap().source_id.as_str(), "7001");
}

#[tokio::test]
async fn test_same_obs_id_from_two_hospitals_kept_apart() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    harness
        .source
        .push(observation("5268", betty(), "Weight", at(2, 8)))
        .await;

    let district = MemorySource::new();
    district
        .push(observation("5268", betty(), "Blood Pressure", at(2, 9)))
        .await;

    let first = harness.engine().execute(SyncMode::Incremental).await;
    let second = harness
        .engine_for_system(district, "openmrs-district")
        .execute(SyncMode::Incremental)
        .await;

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 1);
    assert_eq!(second.already_present, 0);

    let systems: HashSet<_> = harness
        .store
        .records()
        .await
        .into_iter()
        .map(|r| r.provenance.source_system)
        .collect();
    assert_eq!(
        systems,
        HashSet::from(["openmrs".to_string(), "openmrs-district".to_string()])
    );
}

#[tokio::test]
async fn test_sync_person_reads_one_person_and_keeps_checkpoint() {
    let harness = Harness::new();
    harness.add_patient("P7", "Betty Williams").await;
    common::seed_week_of_observations(&harness.source).await;
    harness
        .source
        .push(observation("6002", stranger("900"), "Weight", at(2, 9)))
        .await;

    let engine = harness.engine();
    let person = betty().id;
    let summary = engine.sync_person(&person).await;

    assert!(summary.is_successful(), "run failed: {:?}", summary.error);
    assert_eq!(summary.person.as_ref(), Some(&person));
    assert_eq!(summary.observations_read, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.skipped_no_match, 0);
    assert!(summary.checkpoint_after.is_none());
    assert!(engine.load_state().await.unwrap().is_none());

    // The scheduled run still starts from the beginning and finds the records
    let summary = engine.execute(SyncMode::Incremental).await;
    assert_eq!(summary.already_present, 3);
    assert_eq!(summary.skipped_no_match, 1);
}

#[tokio::test]
async fn test_sync_person_fails_when_source_down() {
    let harness = Harness::new();
    harness.source.set_unavailable(true);

    let summary = harness.engine().sync_person(&betty().id).await;

    assert!(!summary.is_successful());
    assert!(summary.error.is_some());
}

//! Sync engine: one run from checkpoint to summary
//!
//! A run reads observations after the checkpoint (or the whole history),
//! resolves each person, maps and writes the record, and finally records the
//! outcome in the pipeline state. Observations are processed one at a time in
//! source order.

use crate::adapters::database::traits::{RecordStore, StateStorage};
use crate::adapters::source::SourceConnector;
use crate::config::PassportSyncConfig;
use crate::core::identity::{IdentityResolver, NameMatchResolver, Resolution};
use crate::core::mapping::{ConceptCategorizer, RecordMapper};
use crate::core::state::{StateManager, SyncState};
use crate::core::sync::summary::{IssueKind, RunSummary, SyncMode};
use crate::core::sync::writer::RecordWriter;
use crate::domain::{
    EngineError, Result, SourceCursor, SourceObservation, SourcePersonId, WriteOutcome,
};
use crate::log_run_start;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Per-pipeline run settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub pipeline_id: String,
    pub page_size: usize,
    pub dry_run: bool,
    /// Window read by the first incremental run when there is no checkpoint.
    /// `None` reads the whole history.
    pub initial_lookback: Option<chrono::Duration>,
}

impl SyncOptions {
    pub fn from_config(config: &PassportSyncConfig) -> Self {
        Self {
            pipeline_id: config.sync.pipeline_id.clone(),
            page_size: config.source.page_size,
            dry_run: config.application.dry_run,
            initial_lookback: config
                .source
                .initial_lookback_hours
                .map(|hours| chrono::Duration::hours(hours as i64)),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            pipeline_id: "openmrs_observations".to_string(),
            page_size: 100,
            dry_run: false,
            initial_lookback: None,
        }
    }
}

/// Which observations a run reads
enum ReadScope<'a> {
    After(Option<SourceCursor>),
    Person(&'a SourcePersonId),
}

/// Runs sync passes for one pipeline
pub struct SyncEngine {
    connector: Arc<dyn SourceConnector>,
    store: Arc<dyn RecordStore>,
    resolver: Arc<dyn IdentityResolver>,
    mapper: RecordMapper,
    writer: RecordWriter,
    state: StateManager,
    options: SyncOptions,
    /// Set once the destination schema has been applied
    destination_ready: OnceCell<()>,
}

impl SyncEngine {
    /// Engine with the default name-matching resolver over `store`
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        store: Arc<dyn RecordStore>,
        state_storage: Arc<dyn StateStorage>,
        mapper: RecordMapper,
        options: SyncOptions,
    ) -> Self {
        let resolver = Arc::new(NameMatchResolver::new(store.clone(), options.dry_run));
        Self {
            connector,
            writer: RecordWriter::new(store.clone()),
            store,
            resolver,
            mapper,
            state: StateManager::new(state_storage),
            options,
            destination_ready: OnceCell::new(),
        }
    }

    /// Builds the engine from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a mapping keyword is invalid.
    pub fn from_config(
        config: &PassportSyncConfig,
        connector: Arc<dyn SourceConnector>,
        store: Arc<dyn RecordStore>,
        state_storage: Arc<dyn StateStorage>,
    ) -> Result<Self> {
        let categorizer = ConceptCategorizer::from_config(&config.mapping)?;
        let mapper = RecordMapper::new(categorizer, config.source.system_name.clone());
        Ok(Self::new(
            connector,
            store,
            state_storage,
            mapper,
            SyncOptions::from_config(config),
        ))
    }

    /// Replaces the identity resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Applies the destination schema the first time it is called.
    ///
    /// A dry run only checks the connection and leaves the schema alone.
    /// A failed attempt is retried on the next call.
    pub async fn prepare_destination(&self) -> Result<()> {
        self.destination_ready
            .get_or_try_init(|| async {
                if self.options.dry_run {
                    self.store.test_connection().await?;
                    tracing::info!("DRY RUN: Would apply destination schema");
                } else {
                    self.store.ensure_schema().await?;
                }
                Ok::<(), EngineError>(())
            })
            .await?;
        Ok(())
    }

    /// Opens the source and checks both ends respond
    pub async fn test_connections(&self) -> Result<()> {
        let source = self.connector.connect().await?;
        source.test_connection().await?;
        self.store.test_connection().await?;
        tracing::info!(
            source = %source.describe(),
            destination = %self.store.describe(),
            "Source and destination connections verified"
        );
        Ok(())
    }

    /// Executes one run.
    ///
    /// Never returns an error: failures end up in the summary with
    /// [`crate::core::state::RunStatus::Failed`] and the checkpoint unchanged.
    pub async fn execute(&self, mode: SyncMode) -> RunSummary {
        let started = Instant::now();
        let dry_run = self.options.dry_run;
        let pipeline_id = self.options.pipeline_id.as_str();

        if let Err(e) = self.prepare_destination().await {
            let mut summary = RunSummary::new(pipeline_id, mode, dry_run, None);
            summary.fail(format!("Failed to prepare destination: {e}"), started.elapsed());
            summary.log_summary();
            return summary;
        }

        let mut state = match self.state.load_or_init(pipeline_id).await {
            Ok(state) => state,
            Err(e) => {
                let mut summary = RunSummary::new(pipeline_id, mode, dry_run, None);
                summary.fail(format!("Failed to load sync state: {e}"), started.elapsed());
                summary.log_summary();
                return summary;
            }
        };

        if state.is_in_progress() {
            tracing::warn!(
                pipeline_id = %pipeline_id,
                "Previous run did not record an outcome, resuming from last checkpoint"
            );
        }

        let mut summary = RunSummary::new(pipeline_id, mode, dry_run, state.checkpoint.clone());
        state.mark_started(summary.started_at);
        if let Err(e) = self.state.save(&state, dry_run).await {
            summary.fail(format!("Failed to save sync state: {e}"), started.elapsed());
            summary.log_summary();
            return summary;
        }

        let since = self.since(mode, &state);
        log_run_start!(
            summary.run_id,
            mode,
            since
                .as_ref()
                .map_or_else(|| "beginning".to_string(), ToString::to_string)
        );

        match self.run(ReadScope::After(since), &mut summary).await {
            Ok(()) => {
                summary.succeed(started.elapsed());
                state.mark_succeeded(&summary);
            }
            Err(e) => {
                summary.fail(e.to_string(), started.elapsed());
                state.mark_failed(&summary);
            }
        }

        if let Err(e) = self.state.save(&state, dry_run).await {
            tracing::error!(error = %e, "Failed to record run outcome");
            if summary.is_successful() {
                summary.fail(
                    format!("Run finished but its checkpoint could not be saved: {e}"),
                    started.elapsed(),
                );
            }
        }

        summary.log_summary();
        summary
    }

    /// Syncs the complete history of one source person.
    ///
    /// Runs outside the pipeline checkpoint: the pipeline state is neither
    /// read nor written, so the next scheduled run is unaffected. Records
    /// already present are counted as such.
    pub async fn sync_person(&self, person: &SourcePersonId) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(
            self.options.pipeline_id.as_str(),
            SyncMode::FullHistory,
            self.options.dry_run,
            None,
        );
        summary.person = Some(person.clone());

        if let Err(e) = self.prepare_destination().await {
            summary.fail(format!("Failed to prepare destination: {e}"), started.elapsed());
            summary.log_summary();
            return summary;
        }

        let scope = format!("person {person}");
        log_run_start!(summary.run_id, summary.mode, scope);

        match self.run(ReadScope::Person(person), &mut summary).await {
            Ok(()) => summary.succeed(started.elapsed()),
            Err(e) => summary.fail(e.to_string(), started.elapsed()),
        }
        // The pipeline checkpoint is not moved by a single-person run
        summary.checkpoint_after = None;

        summary.log_summary();
        summary
    }

    /// Records a run that was abandoned before it could finish.
    ///
    /// Best effort: a failure to save is logged, not returned.
    pub async fn record_abandoned(&self, summary: &RunSummary) {
        let pipeline_id = self.options.pipeline_id.as_str();
        let mut state = match self.state.load_or_init(pipeline_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load sync state for abandoned run");
                return;
            }
        };

        state.mark_failed(summary);
        if let Err(e) = self.state.save(&state, self.options.dry_run).await {
            tracing::error!(error = %e, "Failed to record abandoned run");
        }
        summary.log_summary();
    }

    /// Loads the pipeline state, if any
    pub async fn load_state(&self) -> Result<Option<SyncState>> {
        self.state.load(&self.options.pipeline_id).await
    }

    fn since(&self, mode: SyncMode, state: &SyncState) -> Option<SourceCursor> {
        match mode {
            SyncMode::FullHistory => None,
            SyncMode::Incremental => state.checkpoint.clone().or_else(|| {
                self.options
                    .initial_lookback
                    .map(|lookback| SourceCursor::starting_at(Utc::now() - lookback))
            }),
        }
    }

    async fn run(&self, scope: ReadScope<'_>, summary: &mut RunSummary) -> Result<()> {
        let source = self.connector.connect().await?;
        tracing::debug!(source = %source.describe(), "Connected to source");

        let mut observations = match scope {
            ReadScope::After(since) => source.observations(since, self.options.page_size),
            ReadScope::Person(person) => {
                source.person_observations(person, self.options.page_size)
            }
        };
        while let Some(item) = observations.next().await {
            match item {
                Ok(observation) => {
                    summary.observations_read += 1;
                    self.process(observation, summary).await?;
                }
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    summary.observations_read += 1;
                    summary.failed += 1;
                    tracing::warn!(error = %e, "Skipping unreadable observation");
                    summary.add_issue(IssueKind::Invalid, None, e.to_string());
                }
            }
        }

        Ok(())
    }

    /// Handles one observation. Only run-aborting errors are returned.
    async fn process(
        &self,
        observation: SourceObservation,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let cursor = observation.cursor();

        if let Err(e) = observation.validate() {
            summary.failed += 1;
            tracing::warn!(source_id = %observation.source_id, error = %e, "Invalid observation");
            summary.add_issue(
                IssueKind::Invalid,
                Some(observation.source_id.clone()),
                e.to_string(),
            );
            summary.advance(cursor);
            return Ok(());
        }

        let patient_id = match self.resolver.resolve(&observation.person).await? {
            Resolution::Matched { patient_id, .. } => patient_id,
            Resolution::NoMatch(reason) => {
                summary.skipped_no_match += 1;
                tracing::info!(
                    source_id = %observation.source_id,
                    source_person_id = %observation.person.id,
                    reason = %reason,
                    "No patient match, skipping observation"
                );
                summary.add_issue(
                    IssueKind::NoMatch,
                    Some(observation.source_id.clone()),
                    format!("person {}: {reason}", observation.person.id),
                );
                summary.advance(cursor);
                return Ok(());
            }
        };

        let record = self.mapper.map(&observation, &patient_id, Utc::now());

        if self.options.dry_run {
            summary.would_insert += 1;
            tracing::debug!(
                patient_id = %patient_id,
                source_id = %observation.source_id,
                record_type = %record.record_type,
                "DRY RUN: Would write clinical record"
            );
        } else {
            match self.writer.write(&record).await {
                Ok(WriteOutcome::Inserted) => summary.inserted += 1,
                Ok(WriteOutcome::AlreadyPresent) => summary.already_present += 1,
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        source_id = %observation.source_id,
                        error = %e,
                        "Failed to write clinical record"
                    );
                    summary.add_issue(
                        IssueKind::Invalid,
                        Some(observation.source_id.clone()),
                        e.to_string(),
                    );
                }
            }
        }

        summary.advance(cursor);
        Ok(())
    }
}

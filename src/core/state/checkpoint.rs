//! Persisted sync state per pipeline
//!
//! A [`SyncState`] holds the checkpoint (high-watermark cursor into the source)
//! together with the outcome of the most recent run. The checkpoint only moves
//! when a run succeeds.

use crate::core::sync::summary::RunSummary;
use crate::domain::SourceCursor;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::InProgress => "in_progress",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Checkpoint and last-run bookkeeping for one pipeline
///
/// # Examples
///
/// ```
/// use passport_sync::core::state::{RunStatus, SyncStateBuilder};
///
/// let state = SyncStateBuilder::new("openmrs_observations")
///     .records_inserted_total(12)
///     .build();
///
/// assert!(state.checkpoint.is_none());
/// assert_eq!(state.last_run_status, RunStatus::NotStarted);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    /// Pipeline id
    pub id: String,

    /// Cursor of the last observation seen by a successful run
    pub checkpoint: Option<SourceCursor>,

    /// Records inserted across all runs
    pub records_inserted_total: u64,

    /// Runs started across the pipeline's lifetime
    pub runs_total: u64,

    pub last_run_started_at: Option<DateTime<Utc>>,

    /// None while a run is in progress
    pub last_run_completed_at: Option<DateTime<Utc>>,

    pub last_run_status: RunStatus,

    pub last_success_at: Option<DateTime<Utc>>,

    /// Summary of the most recent finished run
    pub last_run: Option<RunSummary>,
}

impl SyncState {
    pub fn new(id: impl Into<String>) -> Self {
        SyncStateBuilder::new(id).build()
    }

    pub fn is_in_progress(&self) -> bool {
        self.last_run_status == RunStatus::InProgress
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.last_run_started_at = Some(at);
        self.last_run_completed_at = None;
        self.last_run_status = RunStatus::InProgress;
        self.runs_total += 1;
    }

    /// Records a successful run and moves the checkpoint forward.
    ///
    /// The checkpoint never moves backwards, so a full-history replay that saw
    /// nothing newer leaves it where it was.
    pub fn mark_succeeded(&mut self, summary: &RunSummary) {
        let now = Utc::now();
        self.checkpoint =
            SourceCursor::latest(self.checkpoint.take(), summary.checkpoint_after.clone());
        self.records_inserted_total += summary.inserted;
        self.last_run_completed_at = Some(now);
        self.last_success_at = Some(now);
        self.last_run_status = RunStatus::Succeeded;
        self.last_run = Some(summary.clone());
    }

    /// Records a failed run. The checkpoint is left untouched.
    pub fn mark_failed(&mut self, summary: &RunSummary) {
        self.records_inserted_total += summary.inserted;
        self.last_run_completed_at = Some(Utc::now());
        self.last_run_status = RunStatus::Failed;
        self.last_run = Some(summary.clone());
    }

    /// True when no run has completed within `max_age` of `now`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.last_run_completed_at {
            Some(completed) => now - completed > max_age,
            None => true,
        }
    }
}

/// Builder for [`SyncState`]
pub struct SyncStateBuilder {
    id: String,
    checkpoint: Option<SourceCursor>,
    records_inserted_total: u64,
    last_run_completed_at: Option<DateTime<Utc>>,
    last_run_status: RunStatus,
}

impl SyncStateBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            checkpoint: None,
            records_inserted_total: 0,
            last_run_completed_at: None,
            last_run_status: RunStatus::NotStarted,
        }
    }

    pub fn checkpoint(mut self, checkpoint: SourceCursor) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn records_inserted_total(mut self, count: u64) -> Self {
        self.records_inserted_total = count;
        self
    }

    pub fn last_run_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_run_completed_at = Some(at);
        self
    }

    pub fn last_run_status(mut self, status: RunStatus) -> Self {
        self.last_run_status = status;
        self
    }

    pub fn build(self) -> SyncState {
        SyncState {
            id: self.id,
            checkpoint: self.checkpoint,
            records_inserted_total: self.records_inserted_total,
            runs_total: 0,
            last_run_started_at: None,
            last_run_completed_at: self.last_run_completed_at,
            last_run_status: self.last_run_status,
            last_success_at: None,
            last_run: None,
        }
    }
}

//! Run summary and reporting
//!
//! Every run, successful or not, ends with a [`RunSummary`]. Summaries are
//! returned to the caller and persisted with the pipeline state; there are no
//! process-wide counters.

use crate::core::state::RunStatus;
use crate::domain::{SourceCursor, SourceObservationId, SourcePersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Per-observation issues kept in a summary
pub const MAX_RECORDED_ISSUES: usize = 50;

/// What a run reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Observations after the pipeline checkpoint
    Incremental,
    /// The complete source history
    FullHistory,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => f.write_str("incremental"),
            SyncMode::FullHistory => f.write_str("full_history"),
        }
    }
}

/// Why an observation did not produce a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// No single destination patient matched the source person
    NoMatch,
    /// The observation was malformed
    Invalid,
}

/// An observation that was skipped or failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationIssue {
    pub kind: IssueKind,
    pub source_id: Option<SourceObservationId>,
    pub message: String,
}

/// Summary of one sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline_id: String,
    pub mode: SyncMode,
    /// Set when the run was limited to one source person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<SourcePersonId>,
    pub dry_run: bool,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,

    pub observations_read: u64,
    pub inserted: u64,
    pub already_present: u64,
    pub skipped_no_match: u64,
    pub failed: u64,
    /// Records a dry run would have written
    pub would_insert: u64,

    pub checkpoint_before: Option<SourceCursor>,
    /// Latest cursor seen; becomes the checkpoint if the run succeeds
    pub checkpoint_after: Option<SourceCursor>,

    /// Reason the run was aborted
    pub error: Option<String>,
    pub issues: Vec<ObservationIssue>,
}

impl RunSummary {
    pub fn new(
        pipeline_id: impl Into<String>,
        mode: SyncMode,
        dry_run: bool,
        checkpoint_before: Option<SourceCursor>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_id: pipeline_id.into(),
            mode,
            person: None,
            dry_run,
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            duration_ms: 0,
            observations_read: 0,
            inserted: 0,
            already_present: 0,
            skipped_no_match: 0,
            failed: 0,
            would_insert: 0,
            checkpoint_before,
            checkpoint_after: None,
            error: None,
            issues: Vec::new(),
        }
    }

    /// Records a per-observation issue, keeping at most [`MAX_RECORDED_ISSUES`]
    pub fn add_issue(
        &mut self,
        kind: IssueKind,
        source_id: Option<SourceObservationId>,
        message: impl Into<String>,
    ) {
        if self.issues.len() < MAX_RECORDED_ISSUES {
            self.issues.push(ObservationIssue {
                kind,
                source_id,
                message: message.into(),
            });
        }
    }

    /// Observes the cursor of a processed observation
    pub fn advance(&mut self, cursor: SourceCursor) {
        self.checkpoint_after = SourceCursor::latest(self.checkpoint_after.take(), Some(cursor));
    }

    pub fn succeed(&mut self, duration: Duration) {
        self.status = RunStatus::Succeeded;
        self.duration_ms = duration.as_millis() as u64;
    }

    pub fn fail(&mut self, error: impl Into<String>, duration: Duration) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = duration.as_millis() as u64;
    }

    pub fn is_successful(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Observations that ended up with a record (new or existing)
    pub fn written(&self) -> u64 {
        self.inserted + self.already_present
    }

    /// Log the summary
    pub fn log_summary(&self) {
        crate::log_run_complete!(self);

        if let Some(error) = &self.error {
            tracing::error!(run_id = %self.run_id, error = %error, "Sync run aborted");
        }

        for issue in &self.issues {
            tracing::debug!(
                run_id = %self.run_id,
                kind = ?issue.kind,
                source_id = ?issue.source_id.as_ref().map(|id| id.as_str()),
                message = %issue.message,
                "Observation not synced"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_summary_is_in_progress() {
        let summary = RunSummary::new("p", SyncMode::Incremental, false, None);
        assert_eq!(summary.status, RunStatus::InProgress);
        assert_eq!(summary.written(), 0);
        assert!(summary.checkpoint_after.is_none());
    }

    #[test]
    fn test_issues_are_capped() {
        let mut summary = RunSummary::new("p", SyncMode::Incremental, false, None);
        for i in 0..(MAX_RECORDED_ISSUES + 10) {
            summary.add_issue(IssueKind::NoMatch, None, format!("person {i}"));
        }
        assert_eq!(summary.issues.len(), MAX_RECORDED_ISSUES);
    }

    #[test]
    fn test_advance_tracks_latest_cursor() {
        let mut summary = RunSummary::new("p", SyncMode::Incremental, false, None);
        let at = |d| Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap();
        let id = |s| SourceObservationId::new(s).unwrap();

        summary.advance(SourceCursor::new(at(1), id("1")));
        summary.advance(SourceCursor::new(at(4), id("2")));
        summary.advance(SourceCursor::new(at(4), id("3")));

        assert_eq!(
            summary.checkpoint_after,
            Some(SourceCursor::new(at(4), id("3")))
        );
    }

    #[test]
    fn test_fail_records_error() {
        let mut summary = RunSummary::new("p", SyncMode::FullHistory, false, None);
        summary.fail("source unavailable", Duration::from_millis(1500));
        assert!(!summary.is_successful());
        assert_eq!(summary.duration_ms, 1500);
        assert_eq!(summary.error.as_deref(), Some("source unavailable"));
    }

    #[test]
    fn test_summary_serializes_for_state_storage() {
        let mut summary = RunSummary::new("p", SyncMode::Incremental, true, None);
        summary.succeed(Duration::from_secs(2));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["mode"], "incremental");
        let back: RunSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
    }
}

//! Sync runs
//!
//! [`SyncEngine`] executes a single run; [`RunSummary`] reports it.

pub mod engine;
pub mod summary;
pub mod writer;

pub use engine::{SyncEngine, SyncOptions};
pub use summary::{IssueKind, ObservationIssue, RunSummary, SyncMode, MAX_RECORDED_ISSUES};
pub use writer::RecordWriter;

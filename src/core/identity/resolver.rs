//! Source person → destination patient resolution

use super::normalize::{names_match, normalize_name};
use crate::adapters::database::traits::RecordStore;
use crate::domain::{LinkOutcome, PatientId, Result, SourcePerson, SourcePersonId};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// How a match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPath {
    /// A stored identity link
    CachedLink,
    /// A unique normalized-name match, linked now
    NameMatch,
}

/// Why a person could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The source person has no usable name
    EmptyName,
    /// No destination patient has this name
    NoCandidates,
    /// More than one destination patient has this name
    Ambiguous(usize),
    /// The only candidate is linked to a different source person
    LinkedElsewhere(SourcePersonId),
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatchReason::EmptyName => write!(f, "source person has no name"),
            NoMatchReason::NoCandidates => write!(f, "no patient with a matching name"),
            NoMatchReason::Ambiguous(count) => {
                write!(f, "{count} patients share the name")
            }
            NoMatchReason::LinkedElsewhere(other) => {
                write!(f, "matching patient is linked to source person {other}")
            }
        }
    }
}

/// Outcome of resolving one source person
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched { patient_id: PatientId, via: MatchPath },
    NoMatch(NoMatchReason),
}

/// Maps a source person to a destination patient
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolves `person`. `NoMatch` is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Only destination failures are returned as errors.
    async fn resolve(&self, person: &SourcePerson) -> Result<Resolution>;
}

/// Exact normalized-name matching with a write-once identity link
///
/// Once a source person is linked, the link is returned without looking at
/// names again, even if the source name later changes.
pub struct NameMatchResolver {
    store: Arc<dyn RecordStore>,
    dry_run: bool,
}

impl NameMatchResolver {
    pub fn new(store: Arc<dyn RecordStore>, dry_run: bool) -> Self {
        Self { store, dry_run }
    }
}

#[async_trait]
impl IdentityResolver for NameMatchResolver {
    async fn resolve(&self, person: &SourcePerson) -> Result<Resolution> {
        if let Some(patient_id) = self.store.find_linked_patient(&person.id).await? {
            return Ok(Resolution::Matched {
                patient_id,
                via: MatchPath::CachedLink,
            });
        }

        let full_name = person.full_name();
        let normalized = normalize_name(&full_name);
        if normalized.is_empty() {
            return Ok(Resolution::NoMatch(NoMatchReason::EmptyName));
        }

        // The store prefilters; equality is re-checked here so the match rule
        // does not depend on the backend's notion of punctuation.
        let candidates: Vec<_> = self
            .store
            .find_patients_by_normalized_name(&normalized)
            .await?
            .into_iter()
            .filter(|patient| names_match(&patient.display_name, &full_name))
            .collect();

        let patient = match candidates.as_slice() {
            [] => return Ok(Resolution::NoMatch(NoMatchReason::NoCandidates)),
            [only] => only,
            many => return Ok(Resolution::NoMatch(NoMatchReason::Ambiguous(many.len()))),
        };

        if let Some(identity) = &patient.source_identity {
            if identity.source_person_id != person.id {
                return Ok(Resolution::NoMatch(NoMatchReason::LinkedElsewhere(
                    identity.source_person_id.clone(),
                )));
            }
        }

        if self.dry_run {
            tracing::info!(
                source_person_id = %person.id,
                patient_id = %patient.id,
                "DRY RUN: Would link source person to patient"
            );
            return Ok(Resolution::Matched {
                patient_id: patient.id.clone(),
                via: MatchPath::NameMatch,
            });
        }

        match self.store.link_source_identity(&patient.id, &person.id).await? {
            LinkOutcome::Linked => {
                tracing::info!(
                    source_person_id = %person.id,
                    patient_id = %patient.id,
                    "Linked source person to patient"
                );
                Ok(Resolution::Matched {
                    patient_id: patient.id.clone(),
                    via: MatchPath::NameMatch,
                })
            }
            LinkOutcome::AlreadyLinked(existing) => Ok(Resolution::Matched {
                patient_id: existing,
                via: MatchPath::CachedLink,
            }),
            LinkOutcome::PatientLinkedElsewhere(other) => {
                Ok(Resolution::NoMatch(NoMatchReason::LinkedElsewhere(other)))
            }
        }
    }
}

//! Source observation domain model
//!
//! A [`SourceObservation`] is one clinical observation as read from the EMR.
//! It is immutable once read and never written back to the source.

use super::errors::EngineError;
use super::ids::{SourceObservationId, SourcePersonId};
use super::result::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved value of an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ObservationValue {
    /// Free text
    Text(String),
    /// Numeric measurement
    Numeric(f64),
    /// Coded answer, resolved to the answer concept's display name
    Coded(String),
}

impl ObservationValue {
    /// Picks a single value from the source's nullable value columns.
    ///
    /// Text takes precedence over numeric, numeric over coded. Blank text and
    /// blank coded names count as absent.
    pub fn resolve(
        text: Option<String>,
        numeric: Option<f64>,
        coded: Option<String>,
    ) -> Option<Self> {
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            return Some(ObservationValue::Text(text));
        }
        if let Some(number) = numeric {
            return Some(ObservationValue::Numeric(number));
        }
        coded
            .filter(|c| !c.trim().is_empty())
            .map(ObservationValue::Coded)
    }

    /// Short name of the value kind, as stored in record data
    pub fn kind(&self) -> &'static str {
        match self {
            ObservationValue::Text(_) => "text",
            ObservationValue::Numeric(_) => "numeric",
            ObservationValue::Coded(_) => "coded",
        }
    }
}

impl fmt::Display for ObservationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationValue::Text(text) => write!(f, "{text}"),
            ObservationValue::Numeric(number) => write!(f, "{number}"),
            ObservationValue::Coded(name) => write!(f, "{name}"),
        }
    }
}

/// Person an observation belongs to, as known by the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePerson {
    pub id: SourcePersonId,
    pub given_name: String,
    pub family_name: String,
}

impl SourcePerson {
    pub fn new(
        id: SourcePersonId,
        given_name: impl Into<String>,
        family_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            given_name: given_name.into(),
            family_name: family_name.into(),
        }
    }

    /// Given and family name joined by a single space
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name.trim(), self.family_name.trim())
            .trim()
            .to_string()
    }
}

/// Position in the source's ingestion order
///
/// Ordered by source ingestion time first, then by source id. The checkpoint
/// of a pipeline is the cursor of the last observation a successful run saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCursor {
    pub recorded_at: DateTime<Utc>,
    pub source_id: SourceObservationId,
}

impl SourceCursor {
    pub fn new(recorded_at: DateTime<Utc>, source_id: SourceObservationId) -> Self {
        Self {
            recorded_at,
            source_id,
        }
    }

    /// Cursor placed just before everything recorded at or after `recorded_at`
    pub fn starting_at(recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            source_id: SourceObservationId::lowest(),
        }
    }

    /// Returns the later of two optional cursors.
    ///
    /// On equal timestamps `next` wins, since the source hands out observations
    /// in its own order and `next` was seen after `current`.
    pub fn latest(current: Option<SourceCursor>, next: Option<SourceCursor>) -> Option<Self> {
        match (current, next) {
            (Some(current), Some(next)) => {
                if next.recorded_at >= current.recorded_at {
                    Some(next)
                } else {
                    Some(current)
                }
            }
            (current, None) => current,
            (None, next) => next,
        }
    }
}

impl fmt::Display for SourceCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.recorded_at.to_rfc3339(), self.source_id)
    }
}

/// One observation row from the EMR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceObservation {
    pub source_id: SourceObservationId,
    pub person: SourcePerson,
    pub concept_name: String,
    pub value: Option<ObservationValue>,
    /// Clinical time assigned by the source
    pub observed_at: DateTime<Utc>,
    /// Time the source ingested the observation
    pub recorded_at: DateTime<Utc>,
    pub encounter_id: Option<String>,
    pub provider_name: Option<String>,
    pub location_name: Option<String>,
    pub comments: Option<String>,
}

impl SourceObservation {
    pub fn builder() -> SourceObservationBuilder {
        SourceObservationBuilder::default()
    }

    /// Cursor positioned at this observation
    pub fn cursor(&self) -> SourceCursor {
        SourceCursor::new(self.recorded_at, self.source_id.clone())
    }

    /// True if this observation comes strictly after `cursor` in ingestion
    /// order. Everything is after no cursor.
    pub fn is_after(&self, cursor: Option<&SourceCursor>) -> bool {
        match cursor {
            Some(cursor) => self
                .recorded_at
                .cmp(&cursor.recorded_at)
                .then_with(|| self.source_id.ingestion_cmp(&cursor.source_id))
                .is_gt(),
            None => true,
        }
    }

    /// Checks the fields the mapper relies on.
    pub fn validate(&self) -> Result<()> {
        if self.concept_name.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "observation {} has no concept name",
                self.source_id
            )));
        }
        Ok(())
    }
}

/// Builder for [`SourceObservation`]
#[derive(Debug, Default)]
pub struct SourceObservationBuilder {
    source_id: Option<SourceObservationId>,
    person: Option<SourcePerson>,
    concept_name: Option<String>,
    value: Option<ObservationValue>,
    observed_at: Option<DateTime<Utc>>,
    recorded_at: Option<DateTime<Utc>>,
    encounter_id: Option<String>,
    provider_name: Option<String>,
    location_name: Option<String>,
    comments: Option<String>,
}

impl SourceObservationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_id(mut self, source_id: SourceObservationId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    pub fn person(mut self, person: SourcePerson) -> Self {
        self.person = Some(person);
        self
    }

    pub fn concept_name(mut self, concept_name: impl Into<String>) -> Self {
        self.concept_name = Some(concept_name.into());
        self
    }

    pub fn value(mut self, value: Option<ObservationValue>) -> Self {
        self.value = value;
        self
    }

    pub fn observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    /// Defaults to `observed_at` when not set
    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    pub fn encounter_id(mut self, encounter_id: Option<String>) -> Self {
        self.encounter_id = encounter_id;
        self
    }

    pub fn provider_name(mut self, provider_name: Option<String>) -> Self {
        self.provider_name = provider_name;
        self
    }

    pub fn location_name(mut self, location_name: Option<String>) -> Self {
        self.location_name = location_name;
        self
    }

    pub fn comments(mut self, comments: Option<String>) -> Self {
        self.comments = comments;
        self
    }

    /// Builds the observation
    ///
    /// # Errors
    ///
    /// Returns an error if any required field is missing
    pub fn build(self) -> std::result::Result<SourceObservation, String> {
        let observed_at = self.observed_at.ok_or("observed_at is required")?;
        Ok(SourceObservation {
            source_id: self.source_id.ok_or("source_id is required")?,
            person: self.person.ok_or("person is required")?,
            concept_name: self.concept_name.ok_or("concept_name is required")?,
            value: self.value,
            observed_at,
            recorded_at: self.recorded_at.unwrap_or(observed_at),
            encounter_id: self.encounter_id,
            provider_name: self.provider_name,
            location_name: self.location_name,
            comments: self.comments,
        })
    }
}

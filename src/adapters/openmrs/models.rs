//! OpenMRS REST API models
//!
//! Only the fields of the `obs` resource (`v=full`) the reader needs.

use crate::domain::{
    EngineError, ObservationValue, Result, SourceObservation, SourceObservationId, SourcePerson,
    SourcePersonId,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Page of results from a REST list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RestPage<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,

    #[serde(default)]
    pub links: Vec<RestLink>,
}

impl<T> RestPage<T> {
    /// True if the server advertised another page
    pub fn has_next(&self) -> bool {
        self.links.iter().any(|link| link.rel == "next")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestLink {
    pub rel: String,
    #[serde(default)]
    pub uri: String,
}

/// Minimal `{uuid, display}` reference
#[derive(Debug, Clone, Deserialize)]
pub struct RestRef {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestAuditInfo {
    #[serde(default)]
    pub creator: Option<RestRef>,
    #[serde(default)]
    pub date_created: Option<String>,
}

/// One element of `GET /ws/rest/v1/obs?v=full`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestObservation {
    pub uuid: String,
    pub concept: Option<RestRef>,
    pub person: Option<RestRef>,
    pub obs_datetime: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub encounter: Option<RestRef>,
    #[serde(default)]
    pub location: Option<RestRef>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub voided: bool,
    #[serde(default)]
    pub audit_info: Option<RestAuditInfo>,
}

impl RestObservation {
    /// Converts to the domain model.
    ///
    /// Missing concept, person or date is a [`EngineError::Validation`] for
    /// this item only.
    pub fn into_domain(self) -> Result<SourceObservation> {
        let invalid = |what: &str| {
            EngineError::Validation(format!("observation {} has no {what}", self.uuid))
        };

        let concept_name = self
            .concept
            .as_ref()
            .and_then(|c| c.display.clone())
            .ok_or_else(|| invalid("concept"))?;

        let person_ref = self.person.as_ref().ok_or_else(|| invalid("person"))?;
        let person_id = person_ref
            .uuid
            .clone()
            .and_then(|uuid| SourcePersonId::new(uuid).ok())
            .ok_or_else(|| invalid("person uuid"))?;
        let (given_name, family_name) =
            split_person_display(person_ref.display.as_deref().unwrap_or_default());

        let observed_at = self
            .obs_datetime
            .as_deref()
            .ok_or_else(|| invalid("obsDatetime"))
            .and_then(parse_openmrs_datetime)?;

        let recorded_at = match self
            .audit_info
            .as_ref()
            .and_then(|audit| audit.date_created.as_deref())
        {
            Some(created) => parse_openmrs_datetime(created)?,
            None => observed_at,
        };

        let provider_name = self
            .audit_info
            .as_ref()
            .and_then(|audit| audit.creator.as_ref())
            .and_then(|creator| creator.display.clone());

        let source_id =
            SourceObservationId::new(self.uuid.clone()).map_err(EngineError::Validation)?;

        SourceObservation::builder()
            .source_id(source_id)
            .person(SourcePerson::new(person_id, given_name, family_name))
            .concept_name(concept_name)
            .value(rest_value(&self.value))
            .observed_at(observed_at)
            .recorded_at(recorded_at)
            .encounter_id(self.encounter.and_then(|e| e.uuid))
            .provider_name(provider_name)
            .location_name(self.location.and_then(|l| l.display))
            .comments(self.comment)
            .build()
            .map_err(EngineError::Validation)
    }
}

/// Value of an obs: string → text, number → numeric, object → coded display
fn rest_value(value: &Value) -> Option<ObservationValue> {
    let text = value.as_str().map(str::to_string);
    let numeric = value.as_f64();
    let coded = value
        .as_object()
        .and_then(|object| object.get("display"))
        .and_then(Value::as_str)
        .map(str::to_string);
    ObservationValue::resolve(text, numeric, coded)
}

/// Splits a person `display` into given and family names.
///
/// OpenMRS renders persons as `"<identifier> - <name>"`, sometimes with a
/// parenthesised suffix. The first word of the name is the given name.
pub fn split_person_display(display: &str) -> (String, String) {
    let without_suffix = match display.find('(') {
        Some(index) => &display[..index],
        None => display,
    };
    let name = match without_suffix.rsplit_once(" - ") {
        Some((_, name)) => name,
        None => without_suffix,
    };

    let mut words = name.split_whitespace();
    let given = words.next().unwrap_or_default().to_string();
    let family = words.collect::<Vec<_>>().join(" ");
    (given, family)
}

/// Parses OpenMRS timestamps such as `2024-03-01T09:30:00.000+0000`
pub fn parse_openmrs_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Validation(format!("Invalid OpenMRS timestamp '{value}': {e}")))
}

/// Formats a timestamp the way the REST API expects in query parameters
pub fn format_openmrs_datetime(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string()
}

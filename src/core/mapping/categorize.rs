//! Concept name → record type rules

use crate::config::MappingConfig;
use crate::domain::{EngineError, RecordType, Result};
use regex::Regex;

const VITAL_SIGN_KEYWORDS: &[&str] = &[
    "vitals",
    "vital signs",
    "blood pressure",
    "systolic",
    "diastolic",
    "pulse",
    "heart rate",
    "respiratory rate",
    "temperature",
    "weight",
    "height",
    "bmi",
    "oxygen saturation",
    "spo2",
    "muac",
];

const LAB_RESULT_KEYWORDS: &[&str] = &[
    "test",
    "lab",
    "laboratory",
    "screening",
    "examination",
    "x-ray",
    "ultrasound",
    "scan",
    "blood work",
    "serum",
    "arterial",
    "smear",
    "culture",
    "count",
    "hemoglobin",
    "glucose",
];

const MEDICATION_KEYWORDS: &[&str] = &[
    "medication",
    "medications",
    "drug",
    "drugs",
    "treatment",
    "prescription",
    "dose",
    "regimen",
];

/// Explicit diagnosis markers, checked before any other rule
const DIAGNOSIS_MARKERS: &[&str] = &["diagnosis", "diagnoses", "condition", "problem"];

const CONDITION_KEYWORDS: &[&str] = &[
    "diagnosis",
    "diagnoses",
    "condition",
    "disease",
    "problem",
    "malaria",
    "fever",
    "pain",
    "infection",
    "symptom",
];

const VISIT_KEYWORDS: &[&str] = &["visit", "visits", "encounter", "admission"];

/// Assigns a [`RecordType`] to a concept name
///
/// Rules are checked in order: explicit diagnosis markers, vital signs, lab
/// results, medications, conditions, then visits. A concept matching none of
/// them maps to [`RecordType::Observation`].
#[derive(Debug, Clone)]
pub struct ConceptCategorizer {
    rules: Vec<(RecordType, Regex)>,
}

impl ConceptCategorizer {
    /// Built-in rules only
    pub fn builtin() -> Result<Self> {
        Self::from_config(&MappingConfig::default())
    }

    /// Built-in rules extended with the configured keywords
    pub fn from_config(config: &MappingConfig) -> Result<Self> {
        let rules = vec![
            (RecordType::Condition, keyword_regex(DIAGNOSIS_MARKERS, &[])?),
            (
                RecordType::VitalSign,
                keyword_regex(VITAL_SIGN_KEYWORDS, &config.vital_sign_keywords)?,
            ),
            (
                RecordType::LabResult,
                keyword_regex(LAB_RESULT_KEYWORDS, &config.lab_result_keywords)?,
            ),
            (
                RecordType::Medication,
                keyword_regex(MEDICATION_KEYWORDS, &config.medication_keywords)?,
            ),
            (
                RecordType::Condition,
                keyword_regex(CONDITION_KEYWORDS, &config.condition_keywords)?,
            ),
            (
                RecordType::Visit,
                keyword_regex(VISIT_KEYWORDS, &config.visit_keywords)?,
            ),
        ];
        Ok(Self { rules })
    }

    pub fn categorize(&self, concept_name: &str) -> RecordType {
        for (record_type, pattern) in &self.rules {
            if pattern.is_match(concept_name) {
                return *record_type;
            }
        }

        tracing::debug!(
            concept = %concept_name,
            "Concept fits no category, using generic observation type"
        );
        RecordType::Observation
    }
}

/// Whole-word, case-insensitive alternation of the keywords
fn keyword_regex(builtin: &[&str], extra: &[String]) -> Result<Regex> {
    let alternatives: Vec<String> = builtin
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .map(|keyword| regex::escape(keyword.trim()))
        .collect();
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&pattern)
        .map_err(|e| EngineError::Configuration(format!("Invalid mapping keyword: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Blood Pressure" => RecordType::VitalSign)]
    #[test_case("WEIGHT (KG)" => RecordType::VitalSign)]
    #[test_case("Temperature (C)" => RecordType::VitalSign)]
    #[test_case("Diagnosis: Malaria" => RecordType::Condition)]
    #[test_case("Malaria smear" => RecordType::LabResult)]
    #[test_case("HIV TEST" => RecordType::LabResult)]
    #[test_case("Current drugs used" => RecordType::Medication)]
    #[test_case("Chief complaint: fever" => RecordType::Condition)]
    #[test_case("Visit note" => RecordType::Visit)]
    #[test_case("ENCOUNTER TYPE" => RecordType::Visit)]
    #[test_case("Admission date" => RecordType::Visit)]
    #[test_case("Visit diagnoses" => RecordType::Condition ; "diagnosis marker beats visit")]
    #[test_case("Diagnosis: High blood pressure" => RecordType::Condition)]
    #[test_case("Diagnosis: Low body weight" => RecordType::Condition)]
    #[test_case("Diagnosis: Malaria smear positive" => RecordType::Condition)]
    #[test_case("Diagnosis: Drug reaction" => RecordType::Condition)]
    #[test_case("Problem list: temperature" => RecordType::Condition)]
    #[test_case("Clinical impression" => RecordType::Observation)]
    #[test_case("Testosterone" => RecordType::Observation ; "keywords match whole words only")]
    fn test_builtin_categories(concept: &str) -> RecordType {
        ConceptCategorizer::builtin().unwrap().categorize(concept)
    }

    #[test]
    fn test_configured_keywords_extend_builtin_rules() {
        let config = MappingConfig {
            condition_keywords: vec!["hypertension".to_string()],
            medication_keywords: vec!["antiretroviral".to_string()],
            ..Default::default()
        };
        let categorizer = ConceptCategorizer::from_config(&config).unwrap();

        assert_eq!(
            categorizer.categorize("Stage 2 Hypertension"),
            RecordType::Condition
        );
        assert_eq!(
            categorizer.categorize("Antiretroviral plan"),
            RecordType::Medication
        );
        assert_eq!(categorizer.categorize("Blood Pressure"), RecordType::VitalSign);
    }

    #[test]
    fn test_configured_visit_keywords() {
        let config = MappingConfig {
            visit_keywords: vec!["discharge".to_string()],
            ..Default::default()
        };
        let categorizer = ConceptCategorizer::from_config(&config).unwrap();

        assert_eq!(categorizer.categorize("Discharge summary"), RecordType::Visit);
        assert_eq!(
            categorizer.categorize("Discharge diagnosis"),
            RecordType::Condition
        );
    }
}

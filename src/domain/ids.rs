//! Domain identifier types with validation
//!
//! Newtype wrappers keep source-system identifiers and destination identifiers
//! from being mixed up. Source identifiers are opaque: an OpenMRS database
//! `obs_id` and a REST `uuid` are both just strings here.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, rejecting blank input
            pub fn new(id: impl Into<String>) -> Result<Self, String> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(concat!($label, " cannot be empty").to_string());
                }
                Ok(Self(id))
            }

            /// Returns the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes self and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of an observation in the source EMR
    ///
    /// ```
    /// use passport_sync::domain::ids::SourceObservationId;
    ///
    /// let id = SourceObservationId::new("5268").unwrap();
    /// assert_eq!(id.as_str(), "5268");
    /// ```
    SourceObservationId,
    "Source observation ID"
);

string_id!(
    /// Identifier of a person in the source EMR
    SourcePersonId,
    "Source person ID"
);

string_id!(
    /// Identifier of a patient in the destination store
    PatientId,
    "Patient ID"
);

string_id!(
    /// Identifier of a clinical record in the destination store
    RecordId,
    "Record ID"
);

impl SourceObservationId {
    /// Id sorting before every numeric obs id
    pub(crate) fn lowest() -> Self {
        Self("0".to_string())
    }

    /// Order used for ingestion cursors.
    ///
    /// Two numeric ids (database `obs_id`s) compare by value so `"10"` follows
    /// `"9"`. Anything else compares as text.
    pub fn ingestion_cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }
}

/// Namespace for deterministic record ids
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f0c_1e52_8d3a_4b7e_9a41_2c5d_7e8f_9a01);

impl RecordId {
    /// Derives the record id for an observation written under a patient.
    ///
    /// The same `(patient, source system, source observation)` triple always
    /// yields the same id. Observation ids are only unique within one source
    /// system, so the system is part of the key.
    pub fn derive(
        patient_id: &PatientId,
        source_system: &str,
        source_id: &SourceObservationId,
    ) -> Self {
        let name = format!(
            "{}:{}:{}",
            patient_id.as_str(),
            source_system,
            source_id.as_str()
        );
        Self(Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes()).to_string())
    }
}

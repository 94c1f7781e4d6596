//! Domain error types
//!
//! Error hierarchy for the sync engine. Adapter errors are converted into
//! [`SourceError`] or [`DestinationError`] at the boundary so no third-party
//! driver or HTTP types leak out of the adapters.

use thiserror::Error;

/// Main engine error type
///
/// Only [`EngineError::SourceUnavailable`], [`EngineError::DestinationUnavailable`]
/// and [`EngineError::State`] abort a sync run. Everything else is recorded against
/// the offending observation and the run carries on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The source EMR could not be reached or answered with an error
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    /// The destination store could not be reached or rejected a write
    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(#[from] DestinationError),

    /// Malformed or incomplete data for a single observation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Sync state (checkpoint) could not be loaded or saved
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Returns true if this error must abort the current run.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            EngineError::SourceUnavailable(_)
                | EngineError::DestinationUnavailable(_)
                | EngineError::State(_)
        )
    }
}

/// Source EMR errors (OpenMRS database or REST API)
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to connect to the source
    #[error("Failed to connect to source: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Response or row could not be decoded
    #[error("Invalid response from source: {0}")]
    InvalidResponse(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

/// Destination store errors
#[derive(Debug, Error)]
pub enum DestinationError {
    /// Failed to connect to the destination
    #[error("Failed to connect to destination: {0}")]
    ConnectionFailed(String),

    /// Failed to apply the destination schema
    #[error("Failed to initialize schema: {0}")]
    SchemaFailed(String),

    /// Failed to query
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Failed to insert a record
    #[error("Failed to insert record: {0}")]
    InsertFailed(String),

    /// Failed to write the identity link
    #[error("Failed to link patient: {0}")]
    LinkFailed(String),

    /// A concurrent write claimed the same unique key first
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Configuration(format!("TOML parse error: {err}"))
    }
}

//! Result type alias for engine operations

use super::errors::EngineError;

/// Result type alias using [`EngineError`]
///
/// # Examples
///
/// ```
/// use passport_sync::domain::result::Result;
/// use passport_sync::domain::errors::EngineError;
///
/// fn failing_function() -> Result<()> {
///     Err(EngineError::Validation("Invalid input".to_string()))
/// }
///
/// assert!(failing_function().is_err());
/// ```
pub type Result<T> = std::result::Result<T, EngineError>;

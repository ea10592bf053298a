//! Result type alias for Conduit

use super::errors::ConduitError;

/// Result type alias for Conduit operations
///
/// # Examples
///
/// ```
/// use conduit::domain::result::Result;
/// use conduit::domain::errors::ConduitError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ConduitError::Protocol("missing header".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ConduitError>;

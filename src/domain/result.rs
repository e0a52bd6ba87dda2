//! Result type alias for Meridian
//!
//! This module provides a convenient Result type alias that uses
//! MeridianError as the error type.

use super::errors::MeridianError;

/// Result type alias for Meridian operations
///
/// This is a convenience type alias that uses `MeridianError` as the error
/// type. Use this throughout the codebase for fallible operations.
///
/// # Examples
///
/// ```
/// use meridian::domain::result::Result;
/// use meridian::domain::errors::MeridianError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(MeridianError::Export("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, MeridianError>;

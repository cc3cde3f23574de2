//! Input validation utilities.
//!
//! Common validation for command-line parameters and file paths, using the
//! structured error types from [`crate::errors`] for consistent messages.

use crate::errors::{BamfqError, Result};
use std::path::Path;

/// Validate that a file exists.
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Input BAM")
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use bamfq_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/file.bam", "Input BAM");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(BamfqError::InvalidFileFormat {
            file_type: description.to_string(),
            path: path_ref.display().to_string(),
            reason: "File does not exist".to_string(),
        });
    }
    Ok(())
}

/// Validate that a numeric parameter is at least one.
///
/// # Errors
/// Returns an error if `value` is zero
pub fn validate_nonzero(value: usize, name: &str) -> Result<()> {
    if value == 0 {
        return Err(BamfqError::InvalidParameter {
            parameter: name.to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    Ok(())
}

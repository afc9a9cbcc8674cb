//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^(?i)(trace|debug|info|warn|error)$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(level) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that a log mirror path names a file rather than a directory.
pub fn validate_log_file(path: &str) -> Result<(), ValidationError> {
    if path.trim().is_empty() || path.ends_with('/') {
        return Err(ValidationError::new("invalid_log_file"));
    }
    Ok(())
}

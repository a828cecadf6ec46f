use crate::data::JobConfig;
use crate::error::{FetchError, Result};

/// Check the [`JobConfig`] invariants: every limit that is set must be at least 1.
///
/// Runs on the queue defaults at construction and on the merged config at
/// every enqueue, before any job exists.
///
/// # Examples
///
/// ```
/// use fetchq::{JobConfig, validate_job_config};
///
/// assert!(validate_job_config(&JobConfig::default()).is_ok());
/// assert!(validate_job_config(&JobConfig::default().max_attempts(3)).is_ok());
/// assert!(validate_job_config(&JobConfig::default().max_concurrents(0)).is_err());
/// ```
pub fn validate_job_config(config: &JobConfig) -> Result<()> {
    if let Some(value) = config.max_concurrents
        && value < 1
    {
        return Err(FetchError::InvalidConfig {
            option: "max_concurrents",
            value: value.to_string(),
        });
    }

    if let Some(value) = config.max_attempts
        && value < 1
    {
        return Err(FetchError::InvalidConfig {
            option: "max_attempts",
            value: value.to_string(),
        });
    }

    Ok(())
}

//! Error types for aggregation jobs.

use backoffice_core::BackofficeError;
use thiserror::Error;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors raised by the job runner and the scheduler.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A job failed for one key. Its writes were discarded.
    #[error("job '{job}' failed for {key}: {source}")]
    Job {
        /// Job name.
        job: String,
        /// Job key as displayed.
        key: String,
        /// What went wrong.
        #[source]
        source: BackofficeError,
    },

    /// Storage failure outside a job body.
    #[error(transparent)]
    Database(#[from] BackofficeError),

    /// Two jobs were registered under one name.
    #[error("job '{0}' is already registered")]
    DuplicateJob(String),

    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    /// Create a job failure.
    pub fn job(job: impl Into<String>, key: impl ToString, source: BackofficeError) -> Self {
        Self::Job {
            job: job.into(),
            key: key.to_string(),
            source,
        }
    }

    /// Create an invalid cron error.
    pub fn invalid_cron(reason: impl Into<String>) -> Self {
        Self::InvalidCron(reason.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Check if running the same key again may succeed.
    ///
    /// Storage and downstream failures are transient; everything else is a
    /// programming or configuration error.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Job { source, .. } | Self::Database(source) => matches!(
                source,
                BackofficeError::ExternalService { .. } | BackofficeError::Unknown { .. }
            ),
            _ => false,
        }
    }
}

impl From<TaskError> for BackofficeError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Job { source, .. } | TaskError::Database(source) => source,
            other => Self::unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display() {
        let err = TaskError::job("transaction_daily", "store 3 @ 2024-03-01", BackofficeError::conflict("dup"));
        let text = err.to_string();
        assert!(text.contains("transaction_daily"));
        assert!(text.contains("store 3 @ 2024-03-01"));
    }

    #[test]
    fn test_should_retry() {
        assert!(TaskError::job("j", "k", BackofficeError::unknown("db down")).should_retry());
        assert!(!TaskError::job("j", "k", BackofficeError::conflict("dup")).should_retry());
        assert!(!TaskError::invalid_cron("* *").should_retry());
    }

    #[test]
    fn test_into_backoffice_error_keeps_category() {
        let err: BackofficeError = TaskError::job("j", "k", BackofficeError::not_exist("store")).into();
        assert_eq!(err.status_code().as_u16(), 404);

        let err: BackofficeError = TaskError::DuplicateJob("j".to_string()).into();
        assert_eq!(err.status_code().as_u16(), 500);
    }
}

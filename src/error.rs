//! Error types for the gap-fill engine.

use thiserror::Error;

/// Crate-level error taxonomy.
///
/// Unit-level failures never surface here: they are absorbed by the chunked
/// processor and recorded on the work unit itself. These variants cover the
/// job-level faults that stop an invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GapfillError {
    #[error("State store error: {0}")]
    StateStore(String),

    /// A persisted checkpoint failed to deserialize. Fatal for the run:
    /// resuming from scratch would re-apply side effects already written
    /// to the file store, so this is surfaced for a manual reset instead.
    #[error("State corruption for job {job_name}: {reason}")]
    StateCorruption { job_name: String, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job initialization failed for {job_name}: {reason}")]
    InitializationFailed { job_name: String, reason: String },

    #[error("Completion handler failed for job {job_name}: {reason}")]
    CompletionFailed { job_name: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for GapfillError {
    fn from(error: serde_json::Error) -> Self {
        GapfillError::Validation(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for GapfillError {
    fn from(error: config::ConfigError) -> Self {
        GapfillError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GapfillError>;
